//! Typed dependency-graph construction.
//!
//! Two subbuilders (imports BFS, call expressions over anchor files) feed a
//! node/edge store; `combined` merges both. Collapse modes rewrite node ids
//! (`external` sentinel, file projection, class grouping) and drop
//! self-loops. Truncation preserves anchors first, then fills with internal
//! nodes by confidence. Ordering is re-applied after collapse and after
//! truncation so output is byte-for-byte deterministic.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::adapter::LanguageAdapter;
use crate::anchors::AnchorResolution;
use crate::paths::{file_name, file_stem, is_within, parent, to_repo_relative};
use crate::types::{
    Callsite, EdgeKind, GraphEdge, GraphEdgeType, GraphNode, Language, NodeKind, Range,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphType {
    Imports,
    Calls,
    Combined,
}

impl GraphType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "imports" => Some(Self::Imports),
            "calls" => Some(Self::Calls),
            "combined" => Some(Self::Combined),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::Combined => "combined",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollapseMode {
    None,
    External,
    File,
    Class,
}

impl CollapseMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "external" => Some(Self::External),
            "file" => Some(Self::File),
            "class" => Some(Self::Class),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::External => "external",
            Self::File => "file",
            Self::Class => "class",
        }
    }
}

#[derive(Clone, Debug)]
pub struct GraphOptions {
    pub graph_type: GraphType,
    pub depth: usize,
    pub include_external: bool,
    pub max_nodes: usize,
    pub max_edges: usize,
    pub collapse: CollapseMode,
}

pub struct BuiltGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub truncated: bool,
    pub truncated_nodes: usize,
    pub truncated_edges: usize,
}

/// Node/edge accumulator with id-keyed dedup.
struct GraphStore {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<(String, String, &'static str), GraphEdge>,
}

impl GraphStore {
    fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    /// Merge by id: `anchor || …`, `max(confidence, …)`.
    fn add_node(&mut self, node: GraphNode) {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                existing.anchor = existing.anchor || node.anchor;
                existing.confidence = existing.confidence.max(node.confidence);
                if existing.range.is_none() {
                    existing.range = node.range;
                }
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
            }
        }
    }

    /// Dedup by `(from, to, type)`, keeping the higher confidence.
    fn add_edge(&mut self, edge: GraphEdge) {
        let key = (
            edge.from.clone(),
            edge.to.clone(),
            edge.edge_type.as_str(),
        );
        match self.edges.get_mut(&key) {
            Some(existing) => {
                if edge.confidence > existing.confidence {
                    *existing = edge;
                }
            }
            None => {
                self.edges.insert(key, edge);
            }
        }
    }
}

pub fn build_graph(
    resolution: &AnchorResolution,
    adapters: &[LanguageAdapter],
    repo_root: &str,
    options: &GraphOptions,
) -> BuiltGraph {
    let mut store = GraphStore::new();
    let anchor_rels: HashSet<String> = resolution
        .anchor_files
        .iter()
        .map(|f| to_repo_relative(f, repo_root))
        .collect();

    if matches!(options.graph_type, GraphType::Imports | GraphType::Combined) {
        build_import_subgraph(resolution, adapters, repo_root, options, &mut store);
    }
    if matches!(options.graph_type, GraphType::Calls | GraphType::Combined) {
        build_call_subgraph(resolution, adapters, repo_root, &mut store);
    }

    // Anchor flag is a property of the file, applied uniformly after merge.
    for node in store.nodes.values_mut() {
        if !node.file_path.is_empty() && anchor_rels.contains(&node.file_path) {
            node.anchor = true;
        }
    }

    let (mut nodes, mut edges) = collapse(store, options.collapse);
    sort_nodes(&mut nodes);
    sort_edges_output(&mut edges);

    truncate(nodes, edges, options)
}

fn file_node(
    adapters: &[LanguageAdapter],
    repo_root: &str,
    abs: &str,
    anchor: bool,
) -> GraphNode {
    let language = crate::anchors::language_for(adapters, abs);
    let external = !adapters.iter().any(|a| a.owns(abs));
    let rel = to_repo_relative(abs, repo_root);
    GraphNode {
        id: format!("{}:{}", language.id_prefix(), rel),
        kind: NodeKind::File,
        language,
        name: file_name(&rel).to_string(),
        file_path: rel,
        range: None,
        workspace_root: workspace_root_rel(adapters, repo_root, abs),
        anchor,
        external,
        confidence: 1.0,
    }
}

fn workspace_root_rel(adapters: &[LanguageAdapter], repo_root: &str, abs: &str) -> String {
    adapters
        .iter()
        .map(|a| a.workspace())
        .filter(|w| is_within(abs, &w.root))
        .max_by_key(|w| w.root.len())
        .map(|w| to_repo_relative(&w.root, repo_root))
        .unwrap_or_else(|| ".".to_string())
}

fn build_import_subgraph(
    resolution: &AnchorResolution,
    adapters: &[LanguageAdapter],
    repo_root: &str,
    options: &GraphOptions,
    store: &mut GraphStore,
) {
    for anchor in &resolution.anchor_files {
        store.add_node(file_node(adapters, repo_root, anchor, true));

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(anchor.clone());
        let mut queue: std::collections::VecDeque<(String, usize)> =
            std::collections::VecDeque::new();
        queue.push_back((anchor.clone(), 0));

        while let Some((file, distance)) = queue.pop_front() {
            if distance >= options.depth {
                continue;
            }
            for adapter in adapters {
                let Some(targets) = adapter.import_graph().get(&file) else {
                    continue;
                };
                for (target, kind) in targets {
                    let node = file_node(adapters, repo_root, target, false);
                    if node.external && !options.include_external {
                        continue;
                    }
                    let from_node = file_node(adapters, repo_root, &file, false);
                    let (edge_type, confidence) = match kind {
                        EdgeKind::Static => (GraphEdgeType::Imports, 1.0),
                        EdgeKind::Dynamic => (GraphEdgeType::ImportsDynamic, 0.9),
                    };
                    store.add_edge(GraphEdge {
                        from: from_node.id.clone(),
                        to: node.id.clone(),
                        edge_type,
                        callsite: None,
                        confidence,
                    });
                    store.add_node(node);
                    if visited.insert(target.clone()) {
                        queue.push_back((target.clone(), distance + 1));
                    }
                }
            }
        }

        // Test files point at the anchor they exercise.
        for test_file in related_test_files(anchor, adapters) {
            let test_node = file_node(adapters, repo_root, &test_file, false);
            let anchor_node = file_node(adapters, repo_root, anchor, true);
            store.add_edge(GraphEdge {
                from: test_node.id.clone(),
                to: anchor_node.id.clone(),
                edge_type: GraphEdgeType::Tests,
                callsite: None,
                confidence: 1.0,
            });
            store.add_node(test_node);
        }
    }
}

fn related_test_files(anchor: &str, adapters: &[LanguageAdapter]) -> Vec<String> {
    let dir = parent(anchor);
    let base = file_stem(anchor);
    let mut out = Vec::new();
    for suffix in ["test", "spec"] {
        for ext in ["ts", "tsx", "js", "jsx", "mjs", "cjs", "py"] {
            let path = format!("{}/{}.{}.{}", dir, base, suffix, ext);
            if Path::new(&path).is_file() {
                out.push(path);
            }
        }
    }
    let prefix = format!("test_{}.", base);
    for adapter in adapters {
        for file in adapter.files() {
            if file_name(file).starts_with(&prefix) {
                out.push(file.clone());
            }
        }
    }
    out.sort();
    out.dedup();
    out
}

fn build_call_subgraph(
    resolution: &AnchorResolution,
    adapters: &[LanguageAdapter],
    repo_root: &str,
    store: &mut GraphStore,
) {
    let anchor_set: HashSet<String> = resolution.anchor_files.iter().cloned().collect();
    for anchor in &resolution.anchor_files {
        store.add_node(file_node(adapters, repo_root, anchor, true));
    }

    for adapter in adapters {
        let language = adapter.language();
        for call in adapter.find_call_expressions(Some(&anchor_set), None) {
            let caller_rel = to_repo_relative(&call.caller_file, repo_root);
            let caller_node = match &call.caller_symbol {
                Some(symbol) => symbol_node(
                    adapters,
                    repo_root,
                    language,
                    &caller_rel,
                    symbol,
                    Some(call.range),
                ),
                None => file_node(adapters, repo_root, &call.caller_file, false),
            };

            let callee_node = match call.callee_symbol.split_once('#') {
                Some((rel, symbol)) if !rel.is_empty() => {
                    symbol_node(adapters, repo_root, language, rel, symbol, None)
                }
                _ => unresolved_node(language, &call.callee_symbol, call.confidence),
            };

            let edge_type = if call.confidence < 0.5 {
                GraphEdgeType::CallsUnknown
            } else if call.is_dynamic {
                GraphEdgeType::CallsDynamic
            } else {
                GraphEdgeType::Calls
            };
            store.add_edge(GraphEdge {
                from: caller_node.id.clone(),
                to: callee_node.id.clone(),
                edge_type,
                callsite: Some(Callsite {
                    file_path: caller_rel,
                    range: call.range,
                }),
                confidence: call.confidence,
            });
            store.add_node(caller_node);
            store.add_node(callee_node);
        }
    }
}

fn symbol_node(
    adapters: &[LanguageAdapter],
    repo_root: &str,
    language: Language,
    rel: &str,
    symbol: &str,
    range: Option<Range>,
) -> GraphNode {
    let abs = format!("{}/{}", repo_root.trim_end_matches('/'), rel);
    let external = !adapters.iter().any(|a| a.owns(&abs));
    let kind = if symbol.ends_with(".constructor") {
        NodeKind::Constructor
    } else if symbol.contains('.') {
        NodeKind::Method
    } else {
        NodeKind::Function
    };
    GraphNode {
        id: format!("{}:{}#{}", language.id_prefix(), rel, symbol),
        kind,
        language,
        name: symbol.to_string(),
        file_path: rel.to_string(),
        range,
        workspace_root: workspace_root_rel(adapters, repo_root, &abs),
        anchor: false,
        external,
        confidence: 1.0,
    }
}

/// Placeholder for callees without a resolved file.
fn unresolved_node(language: Language, symbol: &str, confidence: f32) -> GraphNode {
    GraphNode {
        id: format!("{}:[unresolved]#{}", language.id_prefix(), symbol),
        kind: NodeKind::Function,
        language,
        name: symbol.to_string(),
        file_path: String::new(),
        range: None,
        workspace_root: ".".to_string(),
        anchor: false,
        external: true,
        confidence,
    }
}

// --- Collapse ----------------------------------------------------------------

fn collapse(store: GraphStore, mode: CollapseMode) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let nodes: Vec<GraphNode> = store.nodes.into_values().collect();
    let edges: Vec<GraphEdge> = store.edges.into_values().collect();
    match mode {
        CollapseMode::None => (nodes, edges),
        CollapseMode::External => collapse_by(nodes, edges, |node| {
            if node.external {
                let mut sentinel = node.clone();
                sentinel.id = "__external__".to_string();
                sentinel.name = "__external__".to_string();
                sentinel.kind = NodeKind::Module;
                sentinel.file_path = String::new();
                sentinel.range = None;
                sentinel
            } else {
                node.clone()
            }
        }),
        CollapseMode::File => collapse_by(nodes, edges, |node| {
            let mut file = node.clone();
            if let Some((file_part, _)) = node.id.split_once('#') {
                file.id = file_part.to_string();
                file.kind = NodeKind::File;
                file.name = file_name(&node.file_path).to_string();
                file.range = None;
            }
            file
        }),
        CollapseMode::Class => collapse_by(nodes, edges, |node| {
            let Some((file_part, symbol)) = node.id.split_once('#') else {
                return node.clone();
            };
            let Some((class, _member)) = symbol.split_once('.') else {
                return node.clone();
            };
            let mut grouped = node.clone();
            grouped.id = format!("{}#{}", file_part, class);
            grouped.kind = NodeKind::Class;
            grouped.name = class.to_string();
            grouped.range = None;
            grouped
        }),
    }
}

/// Project nodes through `project`, remap edges, drop self-loops, dedup.
/// Anchor and confidence lift to the max over the group.
fn collapse_by(
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    project: impl Fn(&GraphNode) -> GraphNode,
) -> (Vec<GraphNode>, Vec<GraphEdge>) {
    let mut store = GraphStore::new();
    let mut remap: BTreeMap<String, String> = BTreeMap::new();
    for node in &nodes {
        let projected = project(node);
        remap.insert(node.id.clone(), projected.id.clone());
        store.add_node(projected);
    }
    for edge in edges {
        let from = remap.get(&edge.from).cloned().unwrap_or(edge.from.clone());
        let to = remap.get(&edge.to).cloned().unwrap_or(edge.to.clone());
        if from == to {
            continue;
        }
        store.add_edge(GraphEdge {
            from,
            to,
            edge_type: edge.edge_type,
            callsite: edge.callsite,
            confidence: edge.confidence,
        });
    }
    (
        store.nodes.into_values().collect(),
        store.edges.into_values().collect(),
    )
}

// --- Ordering and truncation -------------------------------------------------

fn sort_nodes(nodes: &mut [GraphNode]) {
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
}

fn sort_edges_output(edges: &mut [GraphEdge]) {
    edges.sort_by(|a, b| {
        a.from
            .cmp(&b.from)
            .then_with(|| a.to.cmp(&b.to))
            .then_with(|| a.edge_type.as_str().cmp(b.edge_type.as_str()))
    });
}

fn truncate(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>, options: &GraphOptions) -> BuiltGraph {
    let total_nodes = nodes.len();
    let total_edges = edges.len();

    let (anchors, mut rest): (Vec<GraphNode>, Vec<GraphNode>) =
        nodes.into_iter().partition(|n| n.anchor);

    // Internal before external, confidence descending, id ascending.
    rest.sort_by(|a, b| {
        a.external
            .cmp(&b.external)
            .then_with(|| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut kept: Vec<GraphNode> = Vec::new();
    for node in anchors.into_iter().chain(rest) {
        if kept.len() >= options.max_nodes {
            break;
        }
        kept.push(node);
    }
    let truncated_nodes = total_nodes - kept.len();

    let kept_ids: HashSet<&str> = kept.iter().map(|n| n.id.as_str()).collect();
    let mut surviving: Vec<GraphEdge> = edges
        .into_iter()
        .filter(|e| kept_ids.contains(e.from.as_str()) && kept_ids.contains(e.to.as_str()))
        .collect();

    // Confidence descending, type ascending, from, to; then cap.
    surviving.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.edge_type.as_str().cmp(b.edge_type.as_str()))
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });
    let truncated_edges = surviving.len().saturating_sub(options.max_edges);
    surviving.truncate(options.max_edges);

    let mut nodes = kept;
    sort_nodes(&mut nodes);
    sort_edges_output(&mut surviving);

    BuiltGraph {
        nodes,
        edges: surviving,
        truncated: truncated_nodes > 0 || truncated_edges > 0,
        truncated_nodes,
        truncated_edges,
    }
}
