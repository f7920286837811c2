//! Output rendering.
//!
//! JSON bundles and graphs, a Markdown bundle, and DOT graphs. All paths in
//! rendered output are repo-relative POSIX, and every renderer is a pure
//! function of its input so byte-for-byte determinism holds under
//! `--no-timestamp`.

mod dot;
mod markdown;

use serde_json::json;

use crate::anchors::AnchorResolution;
use crate::budget::SelectionResult;
use crate::graph::{BuiltGraph, GraphOptions};
use crate::paths::to_repo_relative;
use crate::types::Workspace;

pub use dot::render_graph_dot;
pub use markdown::render_bundle_markdown;

pub struct BundleRenderInput<'a> {
    pub repo_root: &'a str,
    pub workspaces: &'a [Workspace],
    pub resolution: &'a AnchorResolution,
    pub selection: &'a SelectionResult,
    pub budget_chars: usize,
    pub budget_tokens: Option<usize>,
    /// Absent under `--no-timestamp`.
    pub timestamp: Option<String>,
    /// Markdown: include per-item reasons in the index.
    pub show_reasons: bool,
}

pub fn render_bundle_json(input: &BundleRenderInput) -> String {
    let selection = input.selection;
    let mut budget = serde_json::Map::new();
    budget.insert("budgetChars".to_string(), json!(input.budget_chars));
    budget.insert("usedChars".to_string(), json!(selection.used_chars));
    if let Some(bt) = input.budget_tokens {
        budget.insert("budgetTokens".to_string(), json!(bt));
    }
    if let Some(ut) = selection.used_tokens {
        budget.insert("usedTokens".to_string(), json!(ut));
    }

    let mut meta = serde_json::Map::new();
    meta.insert("tool".to_string(), json!("repo-slice"));
    meta.insert("version".to_string(), json!(crate::cache::tool_version()));
    if let Some(ts) = &input.timestamp {
        meta.insert("generatedAt".to_string(), json!(ts));
    }
    meta.insert(
        "workspaces".to_string(),
        json!(
            input
                .workspaces
                .iter()
                .map(|w| w.id.clone())
                .collect::<Vec<_>>()
        ),
    );
    meta.insert(
        "anchorFiles".to_string(),
        json!(
            input
                .resolution
                .anchor_files
                .iter()
                .map(|f| to_repo_relative(f, input.repo_root))
                .collect::<Vec<_>>()
        ),
    );
    if !input.resolution.unresolved_symbols.is_empty() {
        meta.insert(
            "unresolvedSymbols".to_string(),
            json!(input.resolution.unresolved_symbols),
        );
    }
    if !input.resolution.ambiguous_symbols.is_empty() {
        let ambiguous: serde_json::Map<String, serde_json::Value> = input
            .resolution
            .ambiguous_symbols
            .iter()
            .map(|(query, defs)| {
                (
                    query.clone(),
                    json!(
                        defs.iter()
                            .map(|d| format!(
                                "{}:{}",
                                to_repo_relative(&d.file_path, input.repo_root),
                                d.range.start_line
                            ))
                            .collect::<Vec<_>>()
                    ),
                )
            })
            .collect();
        meta.insert("ambiguousSymbols".to_string(), json!(ambiguous));
    }
    meta.insert("budget".to_string(), json!(budget));

    let items: Vec<serde_json::Value> = selection
        .items
        .iter()
        .map(|item| {
            let c = &item.candidate;
            let mut obj = serde_json::Map::new();
            obj.insert("kind".to_string(), json!(c.kind));
            obj.insert("lang".to_string(), json!(c.language));
            obj.insert("workspaceRoot".to_string(), json!(c.workspace));
            obj.insert(
                "filePath".to_string(),
                json!(to_repo_relative(&c.file_path, input.repo_root)),
            );
            if let Some(range) = c.range {
                obj.insert("range".to_string(), json!(range));
            }
            obj.insert("reasons".to_string(), json!(c.reasons));
            obj.insert("content".to_string(), json!(item.content));
            serde_json::Value::Object(obj)
        })
        .collect();

    let omitted: Vec<serde_json::Value> = selection
        .omitted
        .iter()
        .map(|entry| {
            let c = &entry.candidate;
            let mut obj = serde_json::Map::new();
            obj.insert(
                "filePath".to_string(),
                json!(to_repo_relative(&c.file_path, input.repo_root)),
            );
            if let Some(range) = c.range {
                obj.insert("range".to_string(), json!(range));
            }
            obj.insert("reason".to_string(), json!(entry.reason));
            serde_json::Value::Object(obj)
        })
        .collect();

    let doc = json!({
        "meta": meta,
        "items": items,
        "omitted": omitted,
    });
    let mut out = serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string());
    out.push('\n');
    out
}

pub struct GraphRenderInput<'a> {
    pub graph: &'a BuiltGraph,
    pub options: &'a GraphOptions,
    pub timestamp: Option<String>,
}

pub fn render_graph_json(input: &GraphRenderInput) -> String {
    let mut meta = serde_json::Map::new();
    meta.insert("tool".to_string(), json!("repo-slice"));
    meta.insert("version".to_string(), json!(crate::cache::tool_version()));
    if let Some(ts) = &input.timestamp {
        meta.insert("generatedAt".to_string(), json!(ts));
    }
    meta.insert(
        "graphType".to_string(),
        json!(input.options.graph_type.as_str()),
    );
    meta.insert("depth".to_string(), json!(input.options.depth));
    meta.insert("maxNodes".to_string(), json!(input.options.max_nodes));
    meta.insert("maxEdges".to_string(), json!(input.options.max_edges));
    meta.insert(
        "collapse".to_string(),
        json!(input.options.collapse.as_str()),
    );
    meta.insert("truncated".to_string(), json!(input.graph.truncated));
    if input.graph.truncated_nodes > 0 {
        meta.insert(
            "truncatedNodes".to_string(),
            json!(input.graph.truncated_nodes),
        );
    }
    if input.graph.truncated_edges > 0 {
        meta.insert(
            "truncatedEdges".to_string(),
            json!(input.graph.truncated_edges),
        );
    }

    let doc = json!({
        "meta": meta,
        "nodes": input.graph.nodes,
        "edges": input.graph.edges,
    });
    let mut out = serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string());
    out.push('\n');
    out
}
