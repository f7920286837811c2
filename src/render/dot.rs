//! DOT graph rendering.
//!
//! `digraph G { rankdir=LR; node [shape=box]; … }` with the styling rules:
//! anchor nodes filled light blue, external nodes dashed gray, class nodes
//! ellipses, function/method/constructor nodes diamonds, dynamic imports
//! and unknown calls dashed, `tests` edges green, `calls` edges blue, and
//! low-confidence edges dotted when not already styled. When nodes span
//! multiple workspaces they nest under `subgraph cluster_N`.

use std::collections::BTreeMap;

use crate::types::{GraphEdge, GraphEdgeType, GraphNode, NodeKind};

use super::GraphRenderInput;

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_attrs(node: &GraphNode) -> String {
    let mut attrs = vec![format!("label=\"{}\"", escape(&node.name))];
    match node.kind {
        NodeKind::Class => attrs.push("shape=ellipse".to_string()),
        NodeKind::Function | NodeKind::Method | NodeKind::Constructor => {
            attrs.push("shape=diamond".to_string())
        }
        NodeKind::File | NodeKind::Module => {}
    }
    if node.anchor {
        attrs.push("style=filled".to_string());
        attrs.push("fillcolor=lightblue".to_string());
    } else if node.external {
        attrs.push("style=dashed".to_string());
        attrs.push("color=gray".to_string());
    }
    attrs.join(", ")
}

fn edge_attrs(edge: &GraphEdge) -> String {
    let mut attrs: Vec<String> = Vec::new();
    let mut styled = false;
    match edge.edge_type {
        GraphEdgeType::Tests => attrs.push("color=green".to_string()),
        GraphEdgeType::Calls => attrs.push("color=blue".to_string()),
        GraphEdgeType::ImportsDynamic | GraphEdgeType::CallsUnknown => {
            attrs.push("style=dashed".to_string());
            styled = true;
        }
        GraphEdgeType::Imports | GraphEdgeType::CallsDynamic => {}
    }
    if edge.confidence < 0.8 && !styled {
        attrs.push("style=dotted".to_string());
    }
    attrs.join(", ")
}

pub fn render_graph_dot(input: &GraphRenderInput) -> String {
    let mut out = String::new();
    out.push_str("digraph G {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box];\n");

    // Cluster per workspace only when more than one contributes nodes.
    let mut by_workspace: BTreeMap<&str, Vec<&GraphNode>> = BTreeMap::new();
    for node in &input.graph.nodes {
        by_workspace
            .entry(node.workspace_root.as_str())
            .or_default()
            .push(node);
    }

    if by_workspace.len() > 1 {
        for (cluster_idx, (workspace, nodes)) in by_workspace.iter().enumerate() {
            out.push_str(&format!("  subgraph cluster_{} {{\n", cluster_idx));
            out.push_str(&format!("    label=\"{}\";\n", escape(workspace)));
            for node in nodes {
                out.push_str(&format!(
                    "    \"{}\" [{}];\n",
                    escape(&node.id),
                    node_attrs(node)
                ));
            }
            out.push_str("  }\n");
        }
    } else {
        for node in &input.graph.nodes {
            out.push_str(&format!(
                "  \"{}\" [{}];\n",
                escape(&node.id),
                node_attrs(node)
            ));
        }
    }

    for edge in &input.graph.edges {
        let attrs = edge_attrs(edge);
        if attrs.is_empty() {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                escape(&edge.from),
                escape(&edge.to)
            ));
        } else {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [{}];\n",
                escape(&edge.from),
                escape(&edge.to),
                attrs
            ));
        }
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BuiltGraph, CollapseMode, GraphOptions, GraphType};
    use crate::types::{Language, Range};

    fn node(id: &str, anchor: bool, external: bool, kind: NodeKind, workspace: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            kind,
            language: Language::Ts,
            name: id.rsplit('/').next().unwrap_or(id).to_string(),
            file_path: id.trim_start_matches("ts:").to_string(),
            range: Some(Range::lines(1, 2)),
            workspace_root: workspace.to_string(),
            anchor,
            external,
            confidence: 1.0,
        }
    }

    fn render(graph: &BuiltGraph) -> String {
        let options = GraphOptions {
            graph_type: GraphType::Combined,
            depth: 2,
            include_external: true,
            max_nodes: 100,
            max_edges: 100,
            collapse: CollapseMode::None,
        };
        render_graph_dot(&super::super::GraphRenderInput {
            graph,
            options: &options,
            timestamp: None,
        })
    }

    #[test]
    fn styles_anchors_externals_and_edges() {
        let graph = BuiltGraph {
            nodes: vec![
                node("ts:src/a.ts", true, false, NodeKind::File, "."),
                node("ts:src/b.ts", false, true, NodeKind::File, "."),
                node("ts:src/c.ts#C", false, false, NodeKind::Class, "."),
            ],
            edges: vec![
                GraphEdge {
                    from: "ts:src/a.ts".to_string(),
                    to: "ts:src/b.ts".to_string(),
                    edge_type: GraphEdgeType::ImportsDynamic,
                    callsite: None,
                    confidence: 0.9,
                },
                GraphEdge {
                    from: "ts:src/a.ts".to_string(),
                    to: "ts:src/c.ts#C".to_string(),
                    edge_type: GraphEdgeType::Tests,
                    callsite: None,
                    confidence: 1.0,
                },
            ],
            truncated: false,
            truncated_nodes: 0,
            truncated_edges: 0,
        };
        let out = render(&graph);
        assert!(out.starts_with("digraph G {"));
        assert!(out.contains("rankdir=LR;"));
        assert!(out.contains("\"ts:src/a.ts\" [label=\"a.ts\", style=filled, fillcolor=lightblue]"));
        assert!(out.contains("\"ts:src/b.ts\" [label=\"b.ts\", style=dashed, color=gray]"));
        assert!(out.contains("shape=ellipse"));
        assert!(out.contains("[style=dashed]"));
        assert!(out.contains("[color=green]"));
        // No clusters for a single workspace.
        assert!(!out.contains("subgraph"));
    }

    #[test]
    fn multi_workspace_graphs_use_clusters() {
        let graph = BuiltGraph {
            nodes: vec![
                node("ts:apps/web/a.ts", false, false, NodeKind::File, "apps/web"),
                node("py:services/api/m.py", false, false, NodeKind::File, "services/api"),
            ],
            edges: vec![],
            truncated: false,
            truncated_nodes: 0,
            truncated_edges: 0,
        };
        let out = render(&graph);
        assert!(out.contains("subgraph cluster_0"));
        assert!(out.contains("subgraph cluster_1"));
        assert!(out.contains("label=\"apps/web\";"));
    }

    #[test]
    fn low_confidence_edges_are_dotted() {
        let graph = BuiltGraph {
            nodes: vec![
                node("ts:a", false, false, NodeKind::File, "."),
                node("ts:b", false, false, NodeKind::File, "."),
            ],
            edges: vec![GraphEdge {
                from: "ts:a".to_string(),
                to: "ts:b".to_string(),
                edge_type: GraphEdgeType::CallsDynamic,
                callsite: None,
                confidence: 0.6,
            }],
            truncated: false,
            truncated_nodes: 0,
            truncated_edges: 0,
        };
        let out = render(&graph);
        assert!(out.contains("[style=dotted]"));
    }
}
