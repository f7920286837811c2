//! Core types shared across the analysis engine.
//!
//! This module defines the data model:
//! - [`Workspace`] - a detected project unit (Node, Python, or mixed)
//! - [`Range`] / [`SymbolLocation`] - source positions
//! - [`EdgeKind`] / [`ImportGraph`] - per-workspace import adjacency
//! - [`CallExpression`] - one call/new site with callee resolution
//! - [`Candidate`] - a potential bundle member with score and reasons
//! - [`GraphNode`] / [`GraphEdge`] - typed output graph elements

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Supported source languages. The adapter set is closed by design: one
/// concrete adapter per variant, dispatched by match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(rename = "typescript")]
    Ts,
    #[serde(rename = "python")]
    Py,
}

impl Language {
    /// Short prefix used in graph node ids (`ts:src/app.ts#main`).
    pub fn id_prefix(self) -> &'static str {
        match self {
            Language::Ts => "ts",
            Language::Py => "py",
        }
    }

    /// Long name used in serialized output.
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Ts => "typescript",
            Language::Py => "python",
        }
    }
}

/// What kind of project a workspace root hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    Node,
    Python,
    Mixed,
}

/// A directory owning its own dependency manifest; the unit of indexing and
/// caching. Created by the workspace detector, immutable afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workspace {
    /// Repo-relative POSIX path of the root, or `"."` for the repo itself.
    pub id: String,
    /// Display name (manifest name when available, else the directory name).
    pub name: String,
    /// Absolute canonical root path.
    pub root: String,
    pub kind: WorkspaceKind,
}

/// `(mtime-ms, size)` pair used only to decide cache validity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub path: String,
    pub mtime_ms: u64,
    pub size: u64,
}

/// 1-based inclusive line range; columns are carried only for graph nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    #[serde(rename = "startLine")]
    pub start_line: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
    #[serde(rename = "startCol", skip_serializing_if = "Option::is_none", default)]
    pub start_col: Option<usize>,
    #[serde(rename = "endCol", skip_serializing_if = "Option::is_none", default)]
    pub end_col: Option<usize>,
}

impl Range {
    pub fn lines(start_line: usize, end_line: usize) -> Self {
        Self {
            start_line,
            end_line,
            start_col: None,
            end_col: None,
        }
    }

    /// Pad by `n` lines on both sides, clamping the start at line 1.
    pub fn padded(self, n: usize) -> Self {
        Range::lines(self.start_line.saturating_sub(n).max(1), self.end_line + n)
    }

    pub fn line_count(self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Why a location entered the working set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationKind {
    Definition,
    Reference,
    Diagnostic,
    DiffHunk,
    Context,
}

/// A resolved source location, optionally naming a symbol.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SymbolLocation {
    /// Absolute canonical path.
    pub file_path: String,
    pub range: Range,
    pub kind: LocationKind,
    pub language: Language,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub symbol_name: Option<String>,
    /// Byte offset of the defining identifier; drives reference lookup.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub symbol_position: Option<usize>,
}

/// Import edge kind. Within a single `(from, to)` pair, static strictly
/// overrides dynamic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Static,
    Dynamic,
}

/// `from-file -> (to-file -> edge kind)`, absolute canonical paths, both
/// endpoints inside the owning workspace root. BTreeMap keeps iteration
/// deterministic.
pub type ImportGraph = BTreeMap<String, BTreeMap<String, EdgeKind>>;

/// Insert an import edge, honoring static-over-dynamic precedence.
pub fn insert_import_edge(graph: &mut ImportGraph, from: &str, to: &str, kind: EdgeKind) {
    let targets = graph.entry(from.to_string()).or_default();
    match targets.get(to) {
        Some(EdgeKind::Static) => {}
        _ => {
            targets.insert(to.to_string(), kind);
        }
    }
}

/// One call or new expression.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CallExpression {
    /// Absolute canonical path of the calling file.
    pub caller_file: String,
    /// Nearest enclosing function/method, dotted with the enclosing class
    /// (`Class.method`, `Class.constructor`). None at module level.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub caller_symbol: Option<String>,
    /// Resolved form `<rel-path>#<name>`, a typed `Type.member`, a joined
    /// chain `a.b.c`, a bare name, or `[dynamic]`.
    pub callee_symbol: String,
    pub range: Range,
    pub confidence: f32,
    pub is_dynamic: bool,
}

/// A Python `def`/`class` definition extracted by the syntactic walker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PyDefinition {
    pub name: String,
    /// "function", "class", or "method".
    pub kind: String,
    pub range: Range,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub class_range: Option<Range>,
}

/// Whether a candidate covers a whole file or a line range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    // Snippet sorts before File: ranking breaks score ties kind-ascending
    // with snippets first.
    Snippet,
    File,
}

/// A potential bundle member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    /// `<filePath>:file` or `<filePath>:<startLine>-<endLine>`.
    pub id: String,
    pub kind: CandidateKind,
    pub language: Language,
    /// Workspace id owning the file.
    pub workspace: String,
    /// Absolute canonical path.
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub range: Option<Range>,
    pub score: i64,
    /// Ordered, duplicate-free.
    pub reasons: Vec<String>,
    pub estimated_chars: usize,
    /// Anchors are never dropped by budget or truncation unless they alone
    /// exceed the limit.
    pub anchor: bool,
}

impl Candidate {
    pub fn file_id(file_path: &str) -> String {
        format!("{}:file", file_path)
    }

    pub fn snippet_id(file_path: &str, range: Range) -> String {
        format!("{}:{}-{}", file_path, range.start_line, range.end_line)
    }
}

/// Graph node kind, reflected in DOT shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Module,
    Function,
    Method,
    Constructor,
    Class,
}

/// Typed output graph node. Paths are repo-relative POSIX.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphNode {
    /// `<lang>:<repo-relative-path>` optionally suffixed `#<symbol-path>`.
    pub id: String,
    pub kind: NodeKind,
    pub language: Language,
    pub name: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub range: Option<Range>,
    #[serde(rename = "workspaceRoot")]
    pub workspace_root: String,
    pub anchor: bool,
    pub external: bool,
    pub confidence: f32,
}

/// Output graph edge type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GraphEdgeType {
    #[serde(rename = "imports")]
    Imports,
    #[serde(rename = "imports-dynamic")]
    ImportsDynamic,
    #[serde(rename = "tests")]
    Tests,
    #[serde(rename = "calls")]
    Calls,
    #[serde(rename = "calls-dynamic")]
    CallsDynamic,
    #[serde(rename = "calls-unknown")]
    CallsUnknown,
}

impl GraphEdgeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imports => "imports",
            Self::ImportsDynamic => "imports-dynamic",
            Self::Tests => "tests",
            Self::Calls => "calls",
            Self::CallsDynamic => "calls-dynamic",
            Self::CallsUnknown => "calls-unknown",
        }
    }
}

/// `{filePath, range}` of an edge's underlying call expression.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Callsite {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub range: Range,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: GraphEdgeType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub callsite: Option<Callsite>,
    pub confidence: f32,
}
