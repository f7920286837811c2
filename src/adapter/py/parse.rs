//! Syntactic walker for Python sources.
//!
//! Line-oriented with indentation tracking: decorated and bare
//! `class`/`def` definitions open a scope closed by the next statement at
//! the same or lower indent. Parenthesized `from … import (…)` statements
//! are joined before matching.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::{PyDefinition, Range};

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid regex literal")
}

fn regex_py_def() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\("))
}

fn regex_py_class() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^class\s+([A-Za-z_]\w*)\s*[:(\[]"))
}

fn regex_py_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^import\s+(.+)$"))
}

fn regex_py_from_import() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| regex(r"^from\s+(\.*)([\w.]*)\s+import\s+(.+)$"))
}

fn regex_py_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Chains first so `a.b.c(` is consumed whole; subscripted calls matched
    // separately by the `]` alternative.
    RE.get_or_init(|| {
        regex(r"(?:([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)+)\s*\(|\b([A-Za-z_]\w*)\s*\(|(\])\s*\()")
    })
}

/// Statement keywords a bare-call match must not be.
const NON_CALL_KEYWORDS: &[&str] = &[
    "if", "elif", "while", "for", "return", "with", "assert", "del", "raise", "yield", "lambda",
    "and", "or", "not", "in", "is", "def", "class", "except", "import", "from", "await", "else",
    "try", "match", "case",
];

/// One raw import statement before module-map resolution.
#[derive(Clone, Debug)]
pub(crate) struct PyImport {
    /// Leading dots of a relative import; 0 for absolute.
    pub level: usize,
    /// Dotted module part, possibly empty (`from . import x`).
    pub module: String,
    /// Names brought in by a `from` import.
    pub names: Vec<String>,
}

/// Callee shape before module-map resolution.
#[derive(Clone, Debug)]
pub(crate) enum RawPyCallee {
    /// `name(...)`.
    Bare(String),
    /// `a.b.c(...)`, split on dots.
    Chain(Vec<String>),
    /// `x[y](...)`.
    Subscript,
}

#[derive(Clone, Debug)]
pub(crate) struct RawPyCall {
    pub callee: RawPyCallee,
    pub line: usize,
    /// Dotted caller symbol (`Class.method` or function name).
    pub caller: Option<String>,
    /// Class of the enclosing method, for `self.x` / `cls.x` resolution.
    pub enclosing_class: Option<String>,
}

pub(crate) struct PyFileFacts {
    pub defs: Vec<PyDefinition>,
    pub imports: Vec<PyImport>,
    pub calls: Vec<RawPyCall>,
}

struct OpenScope {
    indent: usize,
    def_index: usize,
    is_class: bool,
    name: String,
    /// Index of the enclosing open class def, if any.
    class_def_index: Option<usize>,
}

pub(crate) fn parse_py_file(content: &str) -> PyFileFacts {
    let mut defs: Vec<PyDefinition> = Vec::new();
    let mut imports: Vec<PyImport> = Vec::new();
    let mut calls: Vec<RawPyCall> = Vec::new();
    // def index -> class def index, filled as methods close.
    let mut method_classes: Vec<(usize, usize)> = Vec::new();

    let mut open: Vec<OpenScope> = Vec::new();
    let mut last_code_line = 0usize;

    let lines: Vec<&str> = content.lines().collect();
    let mut idx = 0usize;
    while idx < lines.len() {
        let line_no = idx + 1;
        let raw = lines[idx];
        let without_comment = strip_comment(raw);
        let trimmed = without_comment.trim_start();

        if trimmed.is_empty() {
            idx += 1;
            continue;
        }
        let indent = indent_of(without_comment);

        // Close scopes the dedent ends.
        while let Some(top) = open.last() {
            if indent <= top.indent {
                close_scope(&mut open, &mut defs, &mut method_classes, last_code_line);
            } else {
                break;
            }
        }
        last_code_line = line_no;

        // Join parenthesized multi-line imports into one logical line.
        let mut logical = trimmed.to_string();
        if (logical.starts_with("from ") || logical.starts_with("import "))
            && logical.contains('(')
            && !logical.contains(')')
        {
            while idx + 1 < lines.len() && !logical.contains(')') {
                idx += 1;
                last_code_line = idx + 1;
                logical.push(' ');
                logical.push_str(strip_comment(lines[idx]).trim());
            }
        }

        if let Some(caps) = regex_py_from_import().captures(&logical) {
            let level = caps.get(1).map_or(0, |m| m.as_str().len());
            let module = caps.get(2).map_or("", |m| m.as_str()).to_string();
            let names_raw = caps.get(3).map_or("", |m| m.as_str());
            let names = split_import_names(names_raw);
            imports.push(PyImport {
                level,
                module,
                names,
            });
        } else if let Some(caps) = regex_py_import().captures(&logical) {
            for part in caps.get(1).map_or("", |m| m.as_str()).split(',') {
                let mut name = part.trim();
                if let Some((lhs, _)) = name.split_once(" as ") {
                    name = lhs.trim();
                }
                if !name.is_empty() {
                    imports.push(PyImport {
                        level: 0,
                        module: name.to_string(),
                        names: Vec::new(),
                    });
                }
            }
        } else if let Some(caps) = regex_py_class().captures(trimmed) {
            let name = caps.get(1).expect("class name").as_str().to_string();
            let def_index = defs.len();
            defs.push(PyDefinition {
                name: name.clone(),
                kind: "class".to_string(),
                range: Range::lines(line_no, line_no),
                class_name: None,
                class_range: None,
            });
            open.push(OpenScope {
                indent,
                def_index,
                is_class: true,
                name,
                class_def_index: None,
            });
        } else if let Some(caps) = regex_py_def().captures(trimmed) {
            let name = caps.get(1).expect("def name").as_str().to_string();
            let enclosing_class = open.iter().rev().find(|s| s.is_class);
            let (kind, class_name, class_def_index) = match enclosing_class {
                Some(class) => (
                    "method",
                    Some(class.name.clone()),
                    Some(class.def_index),
                ),
                None => ("function", None, None),
            };
            let def_index = defs.len();
            defs.push(PyDefinition {
                name: name.clone(),
                kind: kind.to_string(),
                range: Range::lines(line_no, line_no),
                class_name,
                class_range: None,
            });
            open.push(OpenScope {
                indent,
                def_index,
                is_class: false,
                name,
                class_def_index,
            });
        }

        // Call sites, including on def lines (default arguments).
        collect_calls(trimmed, line_no, &open, &mut calls);
        idx += 1;
    }

    while !open.is_empty() {
        close_scope(&mut open, &mut defs, &mut method_classes, last_code_line);
    }

    // Fill class ranges now every class is closed.
    for (method_idx, class_idx) in method_classes {
        let class_range = defs[class_idx].range;
        defs[method_idx].class_range = Some(class_range);
    }

    PyFileFacts {
        defs,
        imports,
        calls,
    }
}

fn close_scope(
    open: &mut Vec<OpenScope>,
    defs: &mut [PyDefinition],
    method_classes: &mut Vec<(usize, usize)>,
    end_line: usize,
) {
    let Some(scope) = open.pop() else {
        return;
    };
    let def = &mut defs[scope.def_index];
    def.range = Range::lines(def.range.start_line, end_line.max(def.range.start_line));
    if let Some(class_idx) = scope.class_def_index {
        method_classes.push((scope.def_index, class_idx));
    }
}

fn collect_calls(trimmed: &str, line_no: usize, open: &[OpenScope], calls: &mut Vec<RawPyCall>) {
    if trimmed.starts_with("def ")
        || trimmed.starts_with("async def ")
        || trimmed.starts_with("class ")
        || trimmed.starts_with('@')
    {
        return;
    }
    let caller_scope = open.iter().rev().find(|s| !s.is_class);
    let caller = caller_scope.map(|s| {
        match open
            .iter()
            .rev()
            .find(|c| c.is_class && c.indent < s.indent)
        {
            Some(class) => format!("{}.{}", class.name, s.name),
            None => s.name.clone(),
        }
    });
    let enclosing_class = open.iter().rev().find(|s| s.is_class).map(|s| s.name.clone());

    for caps in regex_py_call().captures_iter(trimmed) {
        let callee = if let Some(chain) = caps.get(1) {
            RawPyCallee::Chain(chain.as_str().split('.').map(|s| s.to_string()).collect())
        } else if let Some(bare) = caps.get(2) {
            let name = bare.as_str();
            if NON_CALL_KEYWORDS.contains(&name) {
                continue;
            }
            RawPyCallee::Bare(name.to_string())
        } else {
            RawPyCallee::Subscript
        };
        calls.push(RawPyCall {
            callee,
            line: line_no,
            caller: caller.clone(),
            enclosing_class: enclosing_class.clone(),
        });
    }
}

fn strip_comment(line: &str) -> &str {
    // Good enough syntactically; string literals containing '#' lose their
    // tail, which only affects call detection on that line.
    line.split('#').next().unwrap_or("")
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn split_import_names(raw: &str) -> Vec<String> {
    raw.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .filter_map(|part| {
            let mut name = part.trim();
            if let Some((lhs, _)) = name.split_once(" as ") {
                name = lhs.trim();
            }
            name = name.trim_matches(|c| c == '(' || c == ')').trim();
            if name.is_empty() || name == "*" {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}
