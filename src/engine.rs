//! Orchestration: config, workspace discovery, per-workspace indexing with
//! cache replay, anchor resolution, and the bundle (expand, select) and
//! graph paths.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::adapter::{LanguageAdapter, PyAdapter, TsAdapter};
use crate::adapter::py::PyReuse;
use crate::adapter::ts::{TS_SOURCE_EXTS, TsReuse};
use crate::anchors::{AnchorInputs, AnchorResolution, diff, logs, resolve_anchors};
use crate::budget;
use crate::cache;
use crate::config::{Config, IncludeTests};
use crate::error::{Result, SliceError};
use crate::expand::{ExpansionOptions, expand_candidates};
use crate::graph::{GraphOptions, build_graph};
use crate::ignore::IgnoreSet;
use crate::paths::{canonicalize_logical, extension, is_within, to_repo_relative};
use crate::redact::Redactor;
use crate::render;
use crate::types::Workspace;
use crate::workspace::discover_workspaces;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkspaceScope {
    Auto,
    All,
    Named(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleFormat {
    Markdown,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphFormat {
    Json,
    Dot,
}

/// Anchor flags shared by `pack` and `graph`.
#[derive(Clone, Debug, Default)]
pub struct AnchorFlags {
    pub entries: Vec<String>,
    pub symbols: Vec<String>,
    pub from_diff: Option<String>,
    pub from_log: Option<String>,
}

#[derive(Clone, Debug)]
pub struct PackOptions {
    pub anchors: AnchorFlags,
    pub scope: WorkspaceScope,
    pub fallback_all: bool,
    pub depth: Option<usize>,
    pub include_tests: Option<IncludeTests>,
    pub budget_chars: Option<usize>,
    pub budget_tokens: Option<usize>,
    pub format: BundleFormat,
    pub show_reasons: bool,
    pub redact: bool,
    pub no_timestamp: bool,
    pub symbol_strict: bool,
    pub no_cache: bool,
}

#[derive(Clone, Debug)]
pub struct GraphCommandOptions {
    pub anchors: AnchorFlags,
    pub scope: WorkspaceScope,
    pub fallback_all: bool,
    pub depth: Option<usize>,
    pub graph: GraphOptions,
    pub format: GraphFormat,
    pub no_timestamp: bool,
    pub symbol_strict: bool,
    pub no_cache: bool,
}

pub struct Engine {
    repo_root: String,
    config: Config,
    workspaces: Vec<Workspace>,
}

impl Engine {
    pub fn new(repo_root: &Path) -> Result<Self> {
        let repo_abs = crate::paths::canonicalize_from_cwd(repo_root);
        let root = std::path::PathBuf::from(&repo_abs);
        let config = Config::load(&root)?;
        let workspaces = discover_workspaces(&root)?;
        Ok(Self {
            repo_root: repo_abs,
            config,
            workspaces,
        })
    }

    pub fn repo_root(&self) -> &str {
        &self.repo_root
    }

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    /// Bundle path: resolve anchors, expand, select under budget, render.
    pub fn pack(&self, options: &PackOptions) -> Result<String> {
        let inputs = self.collect_anchor_inputs(&options.anchors)?;
        if inputs.is_empty() {
            return Err(SliceError::Usage(
                "pack requires at least one anchor (--entry, --symbol, --from-diff, --from-log)"
                    .to_string(),
            ));
        }

        let need_symbols = !inputs.symbols.is_empty();
        let scoped = self.select_scope(&options.scope, &inputs)?;
        let mut adapters = self.build_adapters(&scoped, need_symbols, options.no_cache)?;
        let mut resolution = resolve_anchors(&inputs, &adapters, &self.repo_root);

        // Fallback: anything unresolved retries against every workspace.
        if options.fallback_all
            && resolution.has_unresolved()
            && scoped.len() < self.workspaces.len()
        {
            debug!("fallback-all: retrying anchor resolution over all workspaces");
            adapters = self.build_adapters(&self.workspaces.to_vec(), need_symbols, options.no_cache)?;
            resolution = resolve_anchors(&inputs, &adapters, &self.repo_root);
        }

        self.check_resolution(&resolution, options.symbol_strict)?;

        let expansion = ExpansionOptions {
            depth: options.depth.unwrap_or(self.config.depth),
            include_tests: options.include_tests.unwrap_or(self.config.include_tests),
        };
        let candidates = expand_candidates(&resolution, &adapters, &expansion);

        let budget_chars = options.budget_chars.unwrap_or(self.config.budget_chars);
        let redactor = if options.redact || self.config.redact_enabled {
            Some(Redactor::new(&self.config.redact_patterns))
        } else {
            None
        };
        let selection = budget::select(
            candidates,
            budget_chars,
            options.budget_tokens,
            redactor.as_ref(),
        );

        let scoped_workspaces = scoped_list(&adapters);
        let input = render::BundleRenderInput {
            repo_root: &self.repo_root,
            workspaces: &scoped_workspaces,
            resolution: &resolution,
            selection: &selection,
            budget_chars,
            budget_tokens: options.budget_tokens,
            timestamp: timestamp(options.no_timestamp),
            show_reasons: options.show_reasons,
        };
        Ok(match options.format {
            BundleFormat::Json => render::render_bundle_json(&input),
            BundleFormat::Markdown => render::render_bundle_markdown(&input),
        })
    }

    /// Graph path: resolve anchors, build the typed graph, render.
    pub fn graph(&self, options: &GraphCommandOptions) -> Result<String> {
        let inputs = self.collect_anchor_inputs(&options.anchors)?;
        if inputs.is_empty() {
            return Err(SliceError::Usage(
                "graph requires at least one anchor (--entry, --symbol, --from-diff, --from-log)"
                    .to_string(),
            ));
        }

        let need_symbols = !inputs.symbols.is_empty()
            || !matches!(options.graph.graph_type, crate::graph::GraphType::Imports);
        let scoped = self.select_scope(&options.scope, &inputs)?;
        let mut adapters = self.build_adapters(&scoped, need_symbols, options.no_cache)?;
        let mut resolution = resolve_anchors(&inputs, &adapters, &self.repo_root);

        if options.fallback_all
            && resolution.has_unresolved()
            && scoped.len() < self.workspaces.len()
        {
            debug!("fallback-all: retrying anchor resolution over all workspaces");
            adapters = self.build_adapters(&self.workspaces.to_vec(), need_symbols, options.no_cache)?;
            resolution = resolve_anchors(&inputs, &adapters, &self.repo_root);
        }

        self.check_resolution(&resolution, options.symbol_strict)?;

        let mut graph_options = options.graph.clone();
        graph_options.depth = options.depth.unwrap_or(self.config.depth);
        let built = build_graph(&resolution, &adapters, &self.repo_root, &graph_options);

        let input = render::GraphRenderInput {
            graph: &built,
            options: &graph_options,
            timestamp: timestamp(options.no_timestamp),
        };
        Ok(match options.format {
            GraphFormat::Json => render::render_graph_json(&input),
            GraphFormat::Dot => render::render_graph_dot(&input),
        })
    }

    fn collect_anchor_inputs(&self, flags: &AnchorFlags) -> Result<AnchorInputs> {
        let mut inputs = AnchorInputs {
            entries: flags.entries.clone(),
            symbols: flags.symbols.clone(),
            ..Default::default()
        };
        if let Some(rev_range) = &flags.from_diff {
            inputs.diff_hunks = diff::hunks_from_git(&self.repo_root, rev_range)?;
        }
        if let Some(log_path) = &flags.from_log {
            let content = if log_path == "-" {
                let mut buffer = String::new();
                std::io::stdin()
                    .read_to_string(&mut buffer)
                    .map_err(|e| SliceError::io("reading log from stdin", e))?;
                buffer
            } else {
                std::fs::read_to_string(log_path)
                    .map_err(|e| SliceError::io(format!("reading log {}", log_path), e))?
            };
            inputs.log_anchors = logs::parse_log(&content, &self.repo_root);
        }
        Ok(inputs)
    }

    /// Pick the workspaces to index. `auto` uses the workspaces owning any
    /// path-bound anchor; symbol queries (or no owner at all) widen to all.
    fn select_scope(
        &self,
        scope: &WorkspaceScope,
        inputs: &AnchorInputs,
    ) -> Result<Vec<Workspace>> {
        if self.workspaces.is_empty() {
            return Err(SliceError::Config(format!(
                "no workspaces detected under {}",
                self.repo_root
            )));
        }
        match scope {
            WorkspaceScope::All => Ok(self.workspaces.to_vec()),
            WorkspaceScope::Named(name) => {
                let normalized = canonicalize_logical(Path::new(name), Path::new(&self.repo_root));
                self.workspaces
                    .iter()
                    .find(|w| w.id == *name || w.name == *name || w.root == normalized)
                    .cloned()
                    .map(|w| vec![w])
                    .ok_or_else(|| {
                        SliceError::Usage(format!("unknown workspace '{}'", name))
                    })
            }
            WorkspaceScope::Auto => {
                if self.config.workspaces_mode == crate::config::WorkspacesMode::All {
                    return Ok(self.workspaces.to_vec());
                }
                let mut anchor_paths: Vec<String> = Vec::new();
                for entry in &inputs.entries {
                    anchor_paths.push(canonicalize_logical(
                        Path::new(entry),
                        Path::new(&self.repo_root),
                    ));
                }
                anchor_paths.extend(inputs.diff_hunks.iter().map(|h| h.file_path.clone()));
                anchor_paths.extend(inputs.log_anchors.iter().map(|l| l.file_path.clone()));

                let mut selected: BTreeSet<String> = BTreeSet::new();
                for path in &anchor_paths {
                    for workspace in &self.workspaces {
                        if is_within(path, &workspace.root) {
                            selected.insert(workspace.root.clone());
                        }
                    }
                }
                if selected.is_empty() || !inputs.symbols.is_empty() {
                    return Ok(self.workspaces.to_vec());
                }
                Ok(self
                    .workspaces
                    .iter()
                    .filter(|w| selected.contains(&w.root))
                    .cloned()
                    .collect())
            }
        }
    }

    /// Build adapters for the scoped workspaces, replaying valid caches and
    /// writing refreshed records at the end.
    fn build_adapters(
        &self,
        scoped: &[Workspace],
        need_symbols: bool,
        no_cache: bool,
    ) -> Result<Vec<LanguageAdapter>> {
        let mut adapters = Vec::new();
        for workspace in scoped {
            let config = self
                .config
                .with_workspace_overrides(Path::new(&workspace.root))?;
            let ignore_set = IgnoreSet::build(&config.ignore);
            let (ts_files, py_files) = self.workspace_files(workspace, &ignore_set);

            let config_hash = cache::config_hash(&config.ignore, &config.python_import_roots);
            let mut all_files: Vec<String> = ts_files.iter().chain(py_files.iter()).cloned().collect();
            all_files.sort();
            let fingerprints = cache::collect_fingerprints(&all_files);

            let cached = if no_cache {
                None
            } else {
                cache::load(&self.repo_root, &workspace.root, &config_hash)
                    .filter(|record| cache::fingerprints_match(record, &fingerprints))
            };
            let (cached_ts, cached_py) = match cached {
                Some(record) => (record.ts, record.py),
                None => (None, None),
            };

            let ts_adapter = if ts_files.is_empty() {
                None
            } else {
                let reuse = cached_ts.map(|data| TsReuse {
                    import_graph: data.import_graph,
                    call_expressions: data.call_expressions,
                });
                Some(TsAdapter::build(
                    workspace.clone(),
                    &self.repo_root,
                    ts_files,
                    reuse,
                    need_symbols,
                ))
            };
            let py_adapter = if py_files.is_empty() {
                None
            } else {
                let reuse = cached_py.map(|data| PyReuse {
                    module_map: data.module_map,
                    definitions: data.definitions,
                    import_graph: data.import_graph,
                    call_expressions: data.call_expressions,
                });
                Some(PyAdapter::build(
                    workspace.clone(),
                    &self.repo_root,
                    py_files,
                    &config.python_import_roots,
                    reuse,
                    need_symbols,
                ))
            };

            let record = cache::WorkspaceCacheRecord {
                schema_version: cache::CACHE_SCHEMA_VERSION,
                tool_version: cache::tool_version().to_string(),
                workspace_root: workspace.root.clone(),
                config_hash,
                files: fingerprints,
                ts: ts_adapter.as_ref().map(|a| cache::TsCacheData {
                    import_graph: a.import_graph().clone(),
                    call_expressions: Some(a.call_expressions().to_vec()),
                }),
                py: py_adapter.as_ref().map(|a| cache::PyCacheData {
                    module_map: a.module_map().clone(),
                    definitions: a.definitions().clone(),
                    import_graph: a.import_graph().clone(),
                    call_expressions: Some(a.call_expressions().to_vec()),
                }),
            };
            if let Err(err) = cache::store(&self.repo_root, &record) {
                debug!(workspace = %workspace.id, %err, "cache write failed");
            }

            if let Some(adapter) = ts_adapter {
                adapters.push(LanguageAdapter::Ts(adapter));
            }
            if let Some(adapter) = py_adapter {
                adapters.push(LanguageAdapter::Py(adapter));
            }
        }
        Ok(adapters)
    }

    /// Sorted TS and Python source files under a workspace root, minus
    /// ignored paths and dotted directories.
    fn workspace_files(&self, workspace: &Workspace, ignore_set: &IgnoreSet) -> (Vec<String>, Vec<String>) {
        let mut ts_files = Vec::new();
        let mut py_files = Vec::new();
        for entry in walkdir::WalkDir::new(&workspace.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                !(e.file_type().is_dir() && (name.starts_with('.') || name == "node_modules"))
            })
            .flatten()
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let abs = canonicalize_logical(entry.path(), Path::new(&self.repo_root));
            let rel = to_repo_relative(&abs, &self.repo_root);
            if ignore_set.is_ignored(&rel) {
                continue;
            }
            let ext = extension(&abs);
            if TS_SOURCE_EXTS.contains(&ext.as_str()) {
                ts_files.push(abs);
            } else if ext == "py" {
                py_files.push(abs);
            }
        }
        ts_files.sort();
        py_files.sort();
        (ts_files, py_files)
    }

    fn check_resolution(&self, resolution: &AnchorResolution, strict: bool) -> Result<()> {
        let mut detail: Vec<String> = Vec::new();
        for entry in &resolution.unresolved_entries {
            detail.push(format!("entry {}: not found under any workspace in scope", entry));
        }
        for symbol in &resolution.unresolved_symbols {
            detail.push(format!("symbol {}: no definitions found", symbol));
        }
        if strict {
            for (query, defs) in &resolution.ambiguous_symbols {
                let mut lines = vec![format!(
                    "symbol {}: ambiguous ({} definitions)",
                    query,
                    defs.len()
                )];
                for def in defs {
                    lines.push(format!(
                        "  {}:{}",
                        to_repo_relative(&def.file_path, &self.repo_root),
                        def.range.start_line
                    ));
                }
                detail.push(lines.join("\n"));
            }
            if !resolution.ambiguous_symbols.is_empty() {
                return Err(SliceError::AnchorResolution(detail.join("\n")));
            }
        }
        // Every anchor request failed: nothing resolved at all.
        if resolution.candidates.is_empty() && !detail.is_empty() {
            return Err(SliceError::AnchorResolution(detail.join("\n")));
        }
        for line in &detail {
            eprintln!("[repo-slice][warn] {}", line);
        }
        Ok(())
    }
}

fn scoped_list(adapters: &[LanguageAdapter]) -> Vec<Workspace> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::new();
    for adapter in adapters {
        let workspace = adapter.workspace();
        if seen.insert(workspace.root.clone()) {
            out.push(workspace.clone());
        }
    }
    out
}

fn timestamp(no_timestamp: bool) -> Option<String> {
    if no_timestamp {
        None
    } else {
        Some(chrono::Utc::now().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CollapseMode, GraphType};
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "package.json", r#"{"name": "fixture"}"#);
        write(
            dir.path(),
            "src/cli.ts",
            "import { pack } from './commands/pack';\nimport { help } from './commands/help';\npack();\nhelp();\n",
        );
        write(dir.path(), "src/commands/pack.ts", "export function pack() {}\n");
        write(dir.path(), "src/commands/help.ts", "export function help() {}\n");
        dir
    }

    fn pack_options() -> PackOptions {
        PackOptions {
            anchors: AnchorFlags {
                entries: vec!["src/cli.ts".to_string()],
                ..Default::default()
            },
            scope: WorkspaceScope::Auto,
            fallback_all: false,
            depth: Some(1),
            include_tests: None,
            budget_chars: None,
            budget_tokens: None,
            format: BundleFormat::Json,
            show_reasons: false,
            redact: false,
            no_timestamp: true,
            symbol_strict: false,
            no_cache: false,
        }
    }

    #[test]
    fn bundle_includes_entry_and_direct_imports() {
        let dir = fixture();
        let engine = Engine::new(dir.path()).expect("engine");
        let out = engine.pack(&pack_options()).expect("pack");
        let parsed: serde_json::Value = serde_json::from_str(&out).expect("json");
        let paths: Vec<String> = parsed["items"]
            .as_array()
            .expect("items")
            .iter()
            .map(|i| i["filePath"].as_str().expect("path").to_string())
            .collect();
        assert!(paths.contains(&"src/cli.ts".to_string()));
        assert!(paths.contains(&"src/commands/pack.ts".to_string()));
        assert!(paths.contains(&"src/commands/help.ts".to_string()));
        assert!(parsed["meta"]["budget"]["usedChars"].as_u64().expect("used") > 0);
    }

    #[test]
    fn determinism_under_no_timestamp() {
        let dir = fixture();
        let engine = Engine::new(dir.path()).expect("engine");
        let first = engine.pack(&pack_options()).expect("pack 1");
        let second = engine.pack(&pack_options()).expect("pack 2");
        assert_eq!(first, second);
    }

    #[test]
    fn second_run_replays_cache() {
        let dir = fixture();
        let engine = Engine::new(dir.path()).expect("engine");
        engine.pack(&pack_options()).expect("pack 1");
        assert!(dir.path().join(".repo-slice/cache").is_dir());
        // A warm run produces identical output.
        let out = engine.pack(&pack_options()).expect("pack 2");
        assert!(out.contains("src/commands/pack.ts"));
    }

    #[test]
    fn unresolved_everything_is_exit_2() {
        let dir = fixture();
        let engine = Engine::new(dir.path()).expect("engine");
        let mut options = pack_options();
        options.anchors.entries = vec!["src/missing.ts".to_string()];
        let err = engine.pack(&options).expect_err("should fail");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn strict_ambiguity_is_exit_2() {
        let dir = fixture();
        write(dir.path(), "src/a.ts", "export function dup() {}\n");
        write(dir.path(), "src/b.ts", "export function dup() {}\n");
        let engine = Engine::new(dir.path()).expect("engine");
        let mut options = pack_options();
        options.anchors = AnchorFlags {
            symbols: vec!["dup".to_string()],
            ..Default::default()
        };
        options.symbol_strict = true;
        let err = engine.pack(&options).expect_err("should fail");
        assert_eq!(err.exit_code(), 2);
        let message = err.to_string();
        assert!(message.contains("src/a.ts"));
        assert!(message.contains("src/b.ts"));
    }

    #[test]
    fn graph_json_over_fixture() {
        let dir = fixture();
        let engine = Engine::new(dir.path()).expect("engine");
        let options = GraphCommandOptions {
            anchors: AnchorFlags {
                entries: vec!["src/cli.ts".to_string()],
                ..Default::default()
            },
            scope: WorkspaceScope::Auto,
            fallback_all: false,
            depth: Some(1),
            graph: GraphOptions {
                graph_type: GraphType::Imports,
                depth: 1,
                include_external: false,
                max_nodes: 100,
                max_edges: 200,
                collapse: CollapseMode::None,
            },
            format: GraphFormat::Json,
            no_timestamp: true,
            symbol_strict: false,
            no_cache: false,
        };
        let out = engine.graph(&options).expect("graph");
        let parsed: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(parsed["meta"]["graphType"], "imports");
        let ids: Vec<&str> = parsed["nodes"]
            .as_array()
            .expect("nodes")
            .iter()
            .map(|n| n["id"].as_str().expect("id"))
            .collect();
        assert!(ids.contains(&"ts:src/cli.ts"));
        assert!(ids.contains(&"ts:src/commands/pack.ts"));
    }
}
