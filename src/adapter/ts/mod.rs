//! TypeScript/JavaScript adapter.
//!
//! Builds a per-workspace index over all `.ts .tsx .js .jsx .mjs .cjs` files:
//! import graph, top-level symbol definitions, and call expressions. The
//! compiler configuration is discovered from `tsconfig.json` (else
//! `tsconfig.base.json`) for alias resolution; absent both, synthesized
//! defaults apply.

mod resolve;
mod visitor;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    CallExpression, EdgeKind, ImportGraph, Language, LocationKind, Range, SymbolLocation,
    Workspace, insert_import_edge,
};

pub use resolve::{TS_SOURCE_EXTS, TsResolver};

use super::{SymbolQuery, rank_references, read_lines};

/// A top-level declaration (or class member) with the byte offset of its
/// defining identifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TsDefinition {
    pub name: String,
    pub kind: String,
    pub range: Range,
    pub symbol_position: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub class_name: Option<String>,
}

/// Cached structures reusable across runs when fingerprints match.
pub struct TsReuse {
    pub import_graph: ImportGraph,
    pub call_expressions: Option<Vec<CallExpression>>,
}

pub struct TsAdapter {
    pub workspace: Workspace,
    files: Vec<String>,
    file_set: HashSet<String>,
    import_graph: ImportGraph,
    defs: BTreeMap<String, Vec<TsDefinition>>,
    /// Per file, the semantic pass's resolved `(name, line)` usage sites.
    usages: BTreeMap<String, Vec<(String, usize)>>,
    calls: Vec<CallExpression>,
    /// Where compiler options came from ("tsconfig.json", "defaults", ...).
    pub config_source: String,
}

impl TsAdapter {
    /// Build the adapter over `files` (absolute canonical, sorted). When
    /// `reuse` holds a validated cache and `need_symbols` is false, parsing
    /// is skipped entirely and the cached structures are replayed.
    pub fn build(
        workspace: Workspace,
        repo_root: &str,
        files: Vec<String>,
        reuse: Option<TsReuse>,
        need_symbols: bool,
    ) -> Self {
        let resolver = TsResolver::discover(&workspace.root);
        let config_source = resolver.config_source.as_str().to_string();
        let file_set: HashSet<String> = files.iter().cloned().collect();

        if let Some(cached) = reuse
            && !need_symbols
        {
            debug!(workspace = %workspace.id, "replaying cached ts index");
            return Self {
                workspace,
                files,
                file_set,
                import_graph: cached.import_graph,
                defs: BTreeMap::new(),
                usages: BTreeMap::new(),
                calls: cached.call_expressions.unwrap_or_default(),
                config_source,
            };
        }

        let mut import_graph = ImportGraph::new();
        let mut defs = BTreeMap::new();
        let mut usages = BTreeMap::new();
        let mut calls = Vec::new();
        for path in &files {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    debug!(%path, %err, "skipping unreadable source file");
                    continue;
                }
            };
            let facts = visitor::extract_file_facts(&content, path, repo_root, &resolver);
            if facts.parse_errors > 0 {
                debug!(%path, errors = facts.parse_errors, "parser reported errors");
            }
            for (target, kind) in &facts.imports {
                if file_set.contains(target) {
                    insert_import_edge(&mut import_graph, path, target, *kind);
                }
            }
            if !facts.defs.is_empty() {
                defs.insert(path.clone(), facts.defs);
            }
            if !facts.usages.is_empty() {
                usages.insert(path.clone(), facts.usages);
            }
            calls.extend(facts.calls);
        }

        Self {
            workspace,
            files,
            file_set,
            import_graph,
            defs,
            usages,
            calls,
            config_source,
        }
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn owns(&self, path: &str) -> bool {
        self.file_set.contains(path)
    }

    pub fn import_graph(&self) -> &ImportGraph {
        &self.import_graph
    }

    pub fn call_expressions(&self) -> &[CallExpression] {
        &self.calls
    }

    /// Find definitions matching a query: bare symbol, `hint:symbol` with a
    /// path-like hint, `Class.member`, or `default`.
    pub fn find_definitions(&self, query: &str) -> Vec<SymbolLocation> {
        let parsed = SymbolQuery::parse(query);
        let mut out = Vec::new();
        for (path, defs) in &self.defs {
            if !parsed.matches_path(path) {
                continue;
            }
            for def in defs {
                let matched = match (&parsed.class, &parsed.member) {
                    (Some(class), Some(member)) => {
                        def.class_name.as_deref() == Some(class.as_str()) && def.name == *member
                    }
                    _ => def.class_name.is_none() && def.name == parsed.symbol,
                };
                if !matched {
                    continue;
                }
                let symbol_name = match &def.class_name {
                    Some(class) => format!("{}.{}", class, def.name),
                    None => def.name.clone(),
                };
                out.push(SymbolLocation {
                    file_path: path.clone(),
                    range: def.range,
                    kind: LocationKind::Definition,
                    language: Language::Ts,
                    symbol_name: Some(symbol_name),
                    symbol_position: Some(def.symbol_position),
                });
            }
        }
        out
    }

    /// Reference lookup over the semantic pass's resolved usage sites,
    /// ranked by anchor-file membership (+50), anchor-directory membership
    /// (+20), then path and line. Ranges are padded by two lines.
    pub fn find_references(
        &self,
        def: &SymbolLocation,
        limit: usize,
        anchor_files: &HashSet<String>,
    ) -> Vec<SymbolLocation> {
        let Some(name) = def
            .symbol_name
            .as_deref()
            .and_then(|s| s.rsplit('.').next())
        else {
            return Vec::new();
        };

        let mut hits: Vec<(String, usize)> = Vec::new();
        for (path, file_usages) in &self.usages {
            for (usage_name, line) in file_usages {
                // The definition itself is not a reference.
                if path == &def.file_path && *line == def.range.start_line {
                    continue;
                }
                if usage_name == name {
                    hits.push((path.clone(), *line));
                }
            }
        }

        rank_references(&mut hits, anchor_files, None);
        hits.truncate(limit);
        hits.into_iter()
            .map(|(path, line)| SymbolLocation {
                file_path: path,
                range: Range::lines(line, line).padded(2),
                kind: LocationKind::Reference,
                language: Language::Ts,
                symbol_name: def.symbol_name.clone(),
                symbol_position: None,
            })
            .collect()
    }

    pub fn extract_snippet(&self, path: &str, range: Range) -> std::io::Result<String> {
        read_lines(path, range)
    }
}
