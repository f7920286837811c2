//! Anchor resolution.
//!
//! Normalizes the four anchor kinds (entry paths, symbol queries, diff
//! hunks, log anchors) into a canonical set of anchor files plus seed
//! candidates with fixed scores:
//! entry 1000, symbol definition 800, reference 400, diff hunk 700,
//! log anchor 500.

pub mod diff;
pub mod logs;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::adapter::LanguageAdapter;
use crate::paths::{canonicalize_logical, extension, is_within};
use crate::types::{Candidate, CandidateKind, Language, Range, SymbolLocation};

pub use diff::DiffHunk;
pub use logs::LogAnchor;

/// Chars-per-line estimate for snippet candidates; files use their stat size.
const SNIPPET_CHARS_PER_LINE: usize = 80;

#[derive(Default)]
pub struct AnchorInputs {
    pub entries: Vec<String>,
    pub symbols: Vec<String>,
    pub diff_hunks: Vec<DiffHunk>,
    pub log_anchors: Vec<LogAnchor>,
}

impl AnchorInputs {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
            && self.symbols.is_empty()
            && self.diff_hunks.is_empty()
            && self.log_anchors.is_empty()
    }
}

pub struct AnchorResolution {
    pub anchor_files: BTreeSet<String>,
    pub candidates: Vec<Candidate>,
    /// Symbol queries with zero definitions.
    pub unresolved_symbols: Vec<String>,
    /// Query -> every definition it matched, when more than one.
    pub ambiguous_symbols: BTreeMap<String, Vec<SymbolLocation>>,
    /// Entry paths that exist under no workspace in scope.
    pub unresolved_entries: Vec<String>,
}

impl AnchorResolution {
    pub fn has_unresolved(&self) -> bool {
        !self.unresolved_symbols.is_empty() || !self.unresolved_entries.is_empty()
    }
}

/// Resolve all anchor inputs against the adapters in scope order.
pub fn resolve_anchors(
    inputs: &AnchorInputs,
    adapters: &[LanguageAdapter],
    repo_root: &str,
) -> AnchorResolution {
    let mut resolution = AnchorResolution {
        anchor_files: BTreeSet::new(),
        candidates: Vec::new(),
        unresolved_symbols: Vec::new(),
        ambiguous_symbols: BTreeMap::new(),
        unresolved_entries: Vec::new(),
    };

    for entry in &inputs.entries {
        let abs = canonicalize_logical(Path::new(entry), Path::new(repo_root));
        let in_scope = adapters
            .iter()
            .any(|a| is_within(&abs, &a.workspace().root));
        if !in_scope || !Path::new(&abs).is_file() {
            resolution.unresolved_entries.push(entry.clone());
            continue;
        }
        resolution.anchor_files.insert(abs.clone());
        resolution.candidates.push(Candidate {
            id: Candidate::file_id(&abs),
            kind: CandidateKind::File,
            language: language_for(adapters, &abs),
            workspace: workspace_for(adapters, &abs),
            file_path: abs.clone(),
            range: None,
            score: 1000,
            reasons: vec!["entry file".to_string()],
            estimated_chars: file_size(&abs),
            anchor: true,
        });
    }

    for query in &inputs.symbols {
        let mut definitions: Vec<SymbolLocation> = Vec::new();
        for adapter in adapters {
            definitions = adapter.find_definitions(query);
            if !definitions.is_empty() {
                // References rank anchor files collected so far.
                let anchor_files: std::collections::HashSet<String> =
                    resolution.anchor_files.iter().cloned().collect();
                for def in &definitions {
                    resolution.anchor_files.insert(def.file_path.clone());
                    resolution.candidates.push(snippet_candidate(
                        adapters,
                        def.file_path.clone(),
                        def.range,
                        800,
                        format!("symbol definition {}", query),
                        true,
                    ));
                    for reference in adapter.find_references(def, 10, &anchor_files) {
                        resolution.candidates.push(snippet_candidate(
                            adapters,
                            reference.file_path.clone(),
                            reference.range,
                            400,
                            format!("reference to {}", query),
                            false,
                        ));
                    }
                }
                break;
            }
        }
        match definitions.len() {
            0 => resolution.unresolved_symbols.push(query.clone()),
            1 => {}
            _ => {
                resolution
                    .ambiguous_symbols
                    .insert(query.clone(), definitions);
            }
        }
    }

    for hunk in &inputs.diff_hunks {
        if !Path::new(&hunk.file_path).is_file() {
            continue;
        }
        resolution.anchor_files.insert(hunk.file_path.clone());
        resolution.candidates.push(snippet_candidate(
            adapters,
            hunk.file_path.clone(),
            hunk.range,
            700,
            "diff hunk".to_string(),
            true,
        ));
    }

    for anchor in &inputs.log_anchors {
        if !Path::new(&anchor.file_path).is_file() {
            continue;
        }
        resolution.anchor_files.insert(anchor.file_path.clone());
        resolution.candidates.push(snippet_candidate(
            adapters,
            anchor.file_path.clone(),
            Range::lines(anchor.line, anchor.line).padded(3),
            500,
            "log anchor".to_string(),
            true,
        ));
    }

    resolution
}

fn snippet_candidate(
    adapters: &[LanguageAdapter],
    file_path: String,
    range: Range,
    score: i64,
    reason: String,
    anchor: bool,
) -> Candidate {
    Candidate {
        id: Candidate::snippet_id(&file_path, range),
        kind: CandidateKind::Snippet,
        language: language_for(adapters, &file_path),
        workspace: workspace_for(adapters, &file_path),
        range: Some(range),
        estimated_chars: range.line_count() * SNIPPET_CHARS_PER_LINE,
        file_path,
        score,
        reasons: vec![reason],
        anchor,
    }
}

/// Language of the adapter owning the file, else by extension.
pub fn language_for(adapters: &[LanguageAdapter], path: &str) -> Language {
    for adapter in adapters {
        if adapter.owns(path) {
            return adapter.language();
        }
    }
    if extension(path) == "py" {
        Language::Py
    } else {
        Language::Ts
    }
}

/// Workspace id owning the path, else `"."`.
pub fn workspace_for(adapters: &[LanguageAdapter], path: &str) -> String {
    // Longest root wins so nested workspaces beat the repo root.
    adapters
        .iter()
        .map(|a| a.workspace())
        .filter(|w| is_within(path, &w.root))
        .max_by_key(|w| w.root.len())
        .map(|w| w.id.clone())
        .unwrap_or_else(|| ".".to_string())
}

fn file_size(path: &str) -> usize {
    std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::TsAdapter;
    use crate::paths::canonicalize_logical;
    use crate::types::{Workspace, WorkspaceKind};
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> Vec<LanguageAdapter> {
        let sources = [
            ("src/app.ts", "import { run } from './run';\nrun();\n"),
            ("src/run.ts", "export function run() {}\n"),
            ("src/other.ts", "export function run() {}\n"),
        ];
        let mut files = Vec::new();
        for (rel, content) in sources {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            std::fs::write(&path, content).expect("write");
            files.push(canonicalize_logical(&path, dir.path()));
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
            ws, &root, files, None, true,
        ))]
    }

    #[test]
    fn entry_anchor_scores_1000() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(&dir);
        let root = canonicalize_logical(dir.path(), dir.path());
        let inputs = AnchorInputs {
            entries: vec!["src/app.ts".to_string()],
            ..Default::default()
        };
        let res = resolve_anchors(&inputs, &adapters, &root);
        assert_eq!(res.candidates.len(), 1);
        let c = &res.candidates[0];
        assert_eq!(c.score, 1000);
        assert_eq!(c.reasons, vec!["entry file"]);
        assert!(c.anchor);
        assert_eq!(res.anchor_files.len(), 1);
    }

    #[test]
    fn missing_entry_is_unresolved() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(&dir);
        let root = canonicalize_logical(dir.path(), dir.path());
        let inputs = AnchorInputs {
            entries: vec!["src/nope.ts".to_string()],
            ..Default::default()
        };
        let res = resolve_anchors(&inputs, &adapters, &root);
        assert!(res.candidates.is_empty());
        assert_eq!(res.unresolved_entries, vec!["src/nope.ts"]);
    }

    #[test]
    fn ambiguous_symbol_is_flagged_with_all_definitions() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(&dir);
        let root = canonicalize_logical(dir.path(), dir.path());
        let inputs = AnchorInputs {
            symbols: vec!["run".to_string()],
            ..Default::default()
        };
        let res = resolve_anchors(&inputs, &adapters, &root);
        assert_eq!(res.ambiguous_symbols["run"].len(), 2);
        // Both definitions still yield anchor candidates.
        assert!(
            res.candidates
                .iter()
                .filter(|c| c.score == 800 && c.anchor)
                .count()
                >= 2
        );
        // References to the query are seeded at 400.
        assert!(res.candidates.iter().any(|c| c.score == 400));
    }

    #[test]
    fn unknown_symbol_is_unresolved() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(&dir);
        let root = canonicalize_logical(dir.path(), dir.path());
        let inputs = AnchorInputs {
            symbols: vec!["doesNotExist".to_string()],
            ..Default::default()
        };
        let res = resolve_anchors(&inputs, &adapters, &root);
        assert_eq!(res.unresolved_symbols, vec!["doesNotExist"]);
    }

    #[test]
    fn log_anchor_padding_is_three_lines() {
        let dir = TempDir::new().expect("tempdir");
        let adapters = fixture(&dir);
        let root = canonicalize_logical(dir.path(), dir.path());
        let abs = format!("{}/src/app.ts", root);
        let inputs = AnchorInputs {
            log_anchors: vec![LogAnchor {
                file_path: abs,
                line: 10,
            }],
            ..Default::default()
        };
        let res = resolve_anchors(&inputs, &adapters, &root);
        assert_eq!(res.candidates.len(), 1);
        let range = res.candidates[0].range.expect("range");
        assert_eq!((range.start_line, range.end_line), (7, 13));
        assert_eq!(res.candidates[0].score, 500);
    }
}
