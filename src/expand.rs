//! Candidate expansion and scoring.
//!
//! BFS over the import graph from each anchor file (distance 1 scores 250,
//! distance 2 scores 150, deeper 50), plus adjunct candidates: barrel files
//! (120), related tests (100), config boosters (110). A size penalty of
//! `min(200, chars/1000 * 10)` applies to every candidate before ranking.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;

use crate::adapter::LanguageAdapter;
use crate::anchors::{AnchorResolution, language_for, workspace_for};
use crate::config::IncludeTests;
use crate::paths::{file_name, file_stem, parent};
use crate::types::{Candidate, CandidateKind, EdgeKind, Language};

/// Build and framework config names probed at each workspace root.
const CONFIG_BOOSTERS: &[&str] = &[
    "package.json",
    "tsconfig.json",
    "vite.config.ts",
    "vite.config.js",
    "webpack.config.js",
    "next.config.js",
    "babel.config.js",
    "jest.config.js",
    "vitest.config.ts",
    "rollup.config.js",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
];

const BARREL_EXTS: &[&str] = &["ts", "tsx", "js", "jsx"];
const TEST_EXTS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "py"];

pub struct ExpansionOptions {
    pub depth: usize,
    pub include_tests: IncludeTests,
}

/// Expand anchors into the full ranked candidate list.
pub fn expand_candidates(
    resolution: &AnchorResolution,
    adapters: &[LanguageAdapter],
    options: &ExpansionOptions,
) -> Vec<Candidate> {
    let mut map: BTreeMap<String, Candidate> = BTreeMap::new();
    for candidate in &resolution.candidates {
        merge_candidate(&mut map, candidate.clone());
    }

    for anchor in &resolution.anchor_files {
        bfs_from_anchor(anchor, adapters, options.depth, &mut map);
        barrel_candidates(anchor, adapters, &mut map);
        if tests_enabled(options.include_tests, anchor) {
            test_candidates(anchor, adapters, &mut map);
        }
    }

    config_boosters(adapters, &mut map);

    let mut candidates: Vec<Candidate> = map.into_values().collect();
    for candidate in &mut candidates {
        candidate.score -= size_penalty(candidate.estimated_chars);
    }
    rank(&mut candidates);
    candidates
}

/// Size penalty: `min(200, floor(chars/1000) * 10)`.
pub fn size_penalty(estimated_chars: usize) -> i64 {
    ((estimated_chars / 1000) * 10).min(200) as i64
}

/// Total ranking order: score descending, kind ascending (snippets before
/// files), path lexicographic, start line ascending.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.file_path.cmp(&b.file_path))
            .then_with(|| {
                let line = |c: &Candidate| c.range.map_or(0, |r| r.start_line);
                line(a).cmp(&line(b))
            })
    });
}

/// Merge policy: `score = max(old, new)`, reasons union preserving order,
/// `anchor = old || new`.
fn merge_candidate(map: &mut BTreeMap<String, Candidate>, candidate: Candidate) {
    match map.get_mut(&candidate.id) {
        Some(existing) => {
            existing.score = existing.score.max(candidate.score);
            existing.anchor = existing.anchor || candidate.anchor;
            for reason in candidate.reasons {
                if !existing.reasons.contains(&reason) {
                    existing.reasons.push(reason);
                }
            }
        }
        None => {
            map.insert(candidate.id.clone(), candidate);
        }
    }
}

fn bfs_from_anchor(
    anchor: &str,
    adapters: &[LanguageAdapter],
    depth: usize,
    map: &mut BTreeMap<String, Candidate>,
) {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(anchor.to_string());
    let mut queue: VecDeque<(String, usize, bool)> = VecDeque::new();
    queue.push_back((anchor.to_string(), 0, false));

    while let Some((file, distance, _)) = queue.pop_front() {
        if distance >= depth {
            continue;
        }
        // Import-graph adjacency is a BTreeMap, so neighbors come out in
        // sorted path order.
        for adapter in adapters {
            let Some(targets) = adapter.import_graph().get(&file) else {
                continue;
            };
            for (target, kind) in targets {
                if !visited.insert(target.clone()) {
                    continue;
                }
                let next_distance = distance + 1;
                let dynamic = *kind == EdgeKind::Dynamic;
                let score = match next_distance {
                    1 => 250,
                    2 => 150,
                    _ => 50,
                };
                let reason = if dynamic {
                    format!("dynamic-import-distance {}", next_distance)
                } else {
                    format!("import-distance {}", next_distance)
                };
                merge_candidate(
                    map,
                    file_candidate(adapters, target, score, reason, false),
                );
                queue.push_back((target.clone(), next_distance, dynamic));
            }
        }
    }
}

fn barrel_candidates(
    anchor: &str,
    adapters: &[LanguageAdapter],
    map: &mut BTreeMap<String, Candidate>,
) {
    let dir = parent(anchor);
    for ext in BARREL_EXTS {
        let barrel = format!("{}/index.{}", dir, ext);
        if barrel != anchor && Path::new(&barrel).is_file() {
            merge_candidate(
                map,
                file_candidate(adapters, &barrel, 120, "barrel file".to_string(), false),
            );
        }
    }
}

fn tests_enabled(include_tests: IncludeTests, anchor: &str) -> bool {
    match include_tests {
        IncludeTests::True => true,
        IncludeTests::False => false,
        IncludeTests::Auto => anchor.contains("/src/") || anchor.contains("/lib/"),
    }
}

fn test_candidates(
    anchor: &str,
    adapters: &[LanguageAdapter],
    map: &mut BTreeMap<String, Candidate>,
) {
    let dir = parent(anchor);
    let base = file_stem(anchor);
    for suffix in ["test", "spec"] {
        for ext in TEST_EXTS {
            let path = format!("{}/{}.{}.{}", dir, base, suffix, ext);
            if Path::new(&path).is_file() {
                merge_candidate(
                    map,
                    file_candidate(adapters, &path, 100, "related test".to_string(), false),
                );
            }
        }
    }
    // Python-style `test_<base>.*` anywhere in the workspace.
    let prefix = format!("test_{}.", base);
    for adapter in adapters {
        for file in adapter.files() {
            if file_name(file).starts_with(&prefix) {
                merge_candidate(
                    map,
                    file_candidate(adapters, file, 100, "related test".to_string(), false),
                );
            }
        }
    }
}

fn config_boosters(adapters: &[LanguageAdapter], map: &mut BTreeMap<String, Candidate>) {
    let mut seen_roots: HashSet<&str> = HashSet::new();
    for adapter in adapters {
        let root = adapter.workspace().root.as_str();
        if !seen_roots.insert(root) {
            continue;
        }
        for name in CONFIG_BOOSTERS {
            let path = format!("{}/{}", root, name);
            if Path::new(&path).is_file() {
                merge_candidate(
                    map,
                    file_candidate(adapters, &path, 110, "config booster".to_string(), false),
                );
            }
        }
    }
}

fn file_candidate(
    adapters: &[LanguageAdapter],
    path: &str,
    score: i64,
    reason: String,
    anchor: bool,
) -> Candidate {
    Candidate {
        id: Candidate::file_id(path),
        kind: CandidateKind::File,
        language: if crate::paths::extension(path) == "py" {
            Language::Py
        } else {
            language_for(adapters, path)
        },
        workspace: workspace_for(adapters, path),
        file_path: path.to_string(),
        range: None,
        score,
        reasons: vec![reason],
        estimated_chars: std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0),
        anchor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TsAdapter;
    use crate::anchors::{AnchorInputs, resolve_anchors};
    use crate::paths::canonicalize_logical;
    use crate::types::{Workspace, WorkspaceKind};
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, sources: &[(&str, &str)]) -> Vec<LanguageAdapter> {
        let mut files = Vec::new();
        for (rel, content) in sources {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, content).expect("write");
            let abs = canonicalize_logical(&path, dir.path());
            if rel.ends_with(".ts") {
                files.push(abs);
            }
        }
        files.sort();
        let root = canonicalize_logical(dir.path(), dir.path());
        let ws = Workspace {
            id: ".".to_string(),
            name: "fx".to_string(),
            root: root.clone(),
            kind: WorkspaceKind::Node,
        };
        vec![LanguageAdapter::Ts(TsAdapter::build(
            ws, &root, files, None, false,
        ))]
    }

    fn expand_entry(
        dir: &TempDir,
        adapters: &[LanguageAdapter],
        entry: &str,
        options: &ExpansionOptions,
    ) -> Vec<Candidate> {
        let root = canonicalize_logical(dir.path(), dir.path());
        let inputs = AnchorInputs {
            entries: vec![entry.to_string()],
            ..Default::default()
        };
        let resolution = resolve_anchors(&inputs, adapters, &root);
        expand_candidates(&resolution, adapters, options)
    }

    #[test]
    fn bfs_scores_by_distance_and_respects_depth() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(
            &dir,
            &[
                ("src/a.ts", "import './b';\n"),
                ("src/b.ts", "import './c';\n"),
                ("src/c.ts", "import './d';\n"),
                ("src/d.ts", "export const d = 1;\n"),
            ],
        );
        let options = ExpansionOptions {
            depth: 2,
            include_tests: IncludeTests::False,
        };
        let candidates = expand_entry(&dir, &adapters, "src/a.ts", &options);

        let find = |suffix: &str| candidates.iter().find(|c| c.file_path.ends_with(suffix));
        assert!(
            find("b.ts")
                .expect("b")
                .reasons
                .contains(&"import-distance 1".to_string())
        );
        assert!(
            find("c.ts")
                .expect("c")
                .reasons
                .contains(&"import-distance 2".to_string())
        );
        // Depth bound: d is at distance 3.
        assert!(find("d.ts").is_none());
    }

    #[test]
    fn dynamic_edges_carry_dynamic_reason() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(
            &dir,
            &[
                ("src/a.ts", "async function f() { await import('./lazy'); }\n"),
                ("src/lazy.ts", "export const lazy = 1;\n"),
            ],
        );
        let options = ExpansionOptions {
            depth: 1,
            include_tests: IncludeTests::False,
        };
        let candidates = expand_entry(&dir, &adapters, "src/a.ts", &options);
        let lazy = candidates
            .iter()
            .find(|c| c.file_path.ends_with("lazy.ts"))
            .expect("lazy candidate");
        assert_eq!(lazy.reasons, vec!["dynamic-import-distance 1"]);
    }

    #[test]
    fn barrel_test_and_config_adjuncts() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(
            &dir,
            &[
                ("src/widget.ts", "export const w = 1;\n"),
                ("src/widget.test.ts", "import { w } from './widget';\n"),
                ("src/index.ts", "export * from './widget';\n"),
                ("tsconfig.json", "{}"),
            ],
        );
        let options = ExpansionOptions {
            depth: 1,
            include_tests: IncludeTests::Auto,
        };
        let candidates = expand_entry(&dir, &adapters, "src/widget.ts", &options);

        let reason_of = |suffix: &str| {
            candidates
                .iter()
                .find(|c| c.file_path.ends_with(suffix))
                .map(|c| c.reasons.clone())
                .unwrap_or_default()
        };
        assert!(reason_of("src/index.ts").contains(&"barrel file".to_string()));
        assert!(reason_of("widget.test.ts").contains(&"related test".to_string()));
        assert!(reason_of("tsconfig.json").contains(&"config booster".to_string()));
    }

    #[test]
    fn size_penalty_caps_at_200() {
        assert_eq!(size_penalty(500), 0);
        assert_eq!(size_penalty(4_200), 40);
        assert_eq!(size_penalty(1_000_000), 200);
    }

    #[test]
    fn merge_keeps_max_score_and_unions_reasons() {
        let mut map = BTreeMap::new();
        let mk = |score, reason: &str, anchor| Candidate {
            id: "/r/a.ts:file".to_string(),
            kind: CandidateKind::File,
            language: Language::Ts,
            workspace: ".".to_string(),
            file_path: "/r/a.ts".to_string(),
            range: None,
            score,
            reasons: vec![reason.to_string()],
            estimated_chars: 0,
            anchor,
        };
        merge_candidate(&mut map, mk(250, "import-distance 1", false));
        merge_candidate(&mut map, mk(1000, "entry file", true));
        merge_candidate(&mut map, mk(250, "import-distance 1", false));
        let merged = &map["/r/a.ts:file"];
        assert_eq!(merged.score, 1000);
        assert!(merged.anchor);
        assert_eq!(merged.reasons, vec!["import-distance 1", "entry file"]);
    }

    #[test]
    fn ranking_ties_put_snippets_first() {
        let mut candidates = vec![
            Candidate {
                id: "/r/b.ts:file".to_string(),
                kind: CandidateKind::File,
                language: Language::Ts,
                workspace: ".".to_string(),
                file_path: "/r/b.ts".to_string(),
                range: None,
                score: 500,
                reasons: vec![],
                estimated_chars: 0,
                anchor: false,
            },
            Candidate {
                id: "/r/a.ts:1-5".to_string(),
                kind: CandidateKind::Snippet,
                language: Language::Ts,
                workspace: ".".to_string(),
                file_path: "/r/a.ts".to_string(),
                range: Some(crate::types::Range::lines(1, 5)),
                score: 500,
                reasons: vec![],
                estimated_chars: 0,
                anchor: false,
            },
        ];
        rank(&mut candidates);
        assert_eq!(candidates[0].kind, CandidateKind::Snippet);
    }
}
