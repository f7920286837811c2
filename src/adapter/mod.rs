//! Language adapters.
//!
//! One concrete adapter per supported language, dispatched through the
//! closed [`LanguageAdapter`] enum. Both adapters share the same contract:
//! sorted file list, import graph, definition/reference lookup, snippet
//! extraction, and call-expression listing.

pub mod py;
pub mod ts;

use std::collections::HashSet;

use crate::paths::parent;
use crate::types::{CallExpression, ImportGraph, Language, Range, SymbolLocation, Workspace};

pub use py::PyAdapter;
pub use ts::TsAdapter;

/// Closed adapter set; there is no open-ended extension in the core.
pub enum LanguageAdapter {
    Ts(TsAdapter),
    Py(PyAdapter),
}

impl LanguageAdapter {
    pub fn language(&self) -> Language {
        match self {
            Self::Ts(_) => Language::Ts,
            Self::Py(_) => Language::Py,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        match self {
            Self::Ts(a) => &a.workspace,
            Self::Py(a) => &a.workspace,
        }
    }

    pub fn files(&self) -> &[String] {
        match self {
            Self::Ts(a) => a.files(),
            Self::Py(a) => a.files(),
        }
    }

    pub fn owns(&self, path: &str) -> bool {
        match self {
            Self::Ts(a) => a.owns(path),
            Self::Py(a) => a.owns(path),
        }
    }

    pub fn import_graph(&self) -> &ImportGraph {
        match self {
            Self::Ts(a) => a.import_graph(),
            Self::Py(a) => a.import_graph(),
        }
    }

    pub fn find_definitions(&self, query: &str) -> Vec<SymbolLocation> {
        match self {
            Self::Ts(a) => a.find_definitions(query),
            Self::Py(a) => a.find_definitions(query),
        }
    }

    pub fn find_references(
        &self,
        def: &SymbolLocation,
        limit: usize,
        anchor_files: &HashSet<String>,
    ) -> Vec<SymbolLocation> {
        match self {
            Self::Ts(a) => a.find_references(def, limit, anchor_files),
            Self::Py(a) => a.find_references(def, limit, anchor_files),
        }
    }

    pub fn extract_snippet(&self, path: &str, range: Range) -> std::io::Result<String> {
        match self {
            Self::Ts(a) => a.extract_snippet(path, range),
            Self::Py(a) => a.extract_snippet(path, range),
        }
    }

    pub fn find_call_expressions(
        &self,
        files: Option<&HashSet<String>>,
        symbol_filter: Option<&str>,
    ) -> Vec<CallExpression> {
        let all = match self {
            Self::Ts(a) => a.call_expressions(),
            Self::Py(a) => a.call_expressions(),
        };
        all.iter()
            .filter(|call| files.is_none_or(|set| set.contains(&call.caller_file)))
            .filter(|call| {
                symbol_filter.is_none_or(|filter| {
                    call.callee_symbol.contains(filter)
                        || call
                            .caller_symbol
                            .as_deref()
                            .is_some_and(|s| s.contains(filter))
                })
            })
            .cloned()
            .collect()
    }
}

/// Parsed symbol query: bare `symbol`, `hint:symbol` with a path-like hint,
/// or `Class.member`.
pub(crate) struct SymbolQuery {
    pub hint: Option<String>,
    pub symbol: String,
    pub class: Option<String>,
    pub member: Option<String>,
}

impl SymbolQuery {
    pub fn parse(query: &str) -> Self {
        let (hint, rest) = match query.split_once(':') {
            Some((h, r)) if !h.is_empty() && !r.is_empty() => (Some(h.to_string()), r),
            _ => (None, query),
        };
        let (class, member) = match rest.split_once('.') {
            Some((c, m)) if !c.is_empty() && !m.is_empty() && !m.contains('.') => {
                (Some(c.to_string()), Some(m.to_string()))
            }
            _ => (None, None),
        };
        Self {
            hint,
            symbol: rest.to_string(),
            class,
            member,
        }
    }

    pub fn matches_path(&self, path: &str) -> bool {
        self.hint.as_deref().is_none_or(|h| path.contains(h))
    }
}

/// Rank `(path, line)` reference hits in place: anchor-file membership +50,
/// anchor-directory membership +20, same-file-as-definition +60, then path
/// lexicographic, then line.
pub(crate) fn rank_references(
    hits: &mut [(String, usize)],
    anchor_files: &HashSet<String>,
    definition_file: Option<&str>,
) {
    let anchor_dirs: HashSet<String> = anchor_files
        .iter()
        .map(|f| parent(f).to_string())
        .collect();
    let score = |path: &str| -> i64 {
        let mut s = 0;
        if anchor_files.contains(path) {
            s += 50;
        }
        if anchor_dirs.contains(parent(path)) {
            s += 20;
        }
        if definition_file == Some(path) {
            s += 60;
        }
        s
    };
    hits.sort_by(|a, b| {
        score(&b.0)
            .cmp(&score(&a.0))
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.cmp(&b.1))
    });
}

/// Read an inclusive 1-based line range from a file.
pub(crate) fn read_lines(path: &str, range: Range) -> std::io::Result<String> {
    let content = std::fs::read_to_string(path)?;
    let mut out = String::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if line_no < range.start_line {
            continue;
        }
        if line_no > range.end_line {
            break;
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}
