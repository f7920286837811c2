//! Python adapter.
//!
//! Same contract as the TS/JS adapter, implemented over the syntactic
//! walker in [`parse`]. A dotted module map (computed against the
//! configured import roots, default `["src", "."]`) drives import and
//! symbol resolution.

mod parse;

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::paths::to_repo_relative;
use crate::types::{
    CallExpression, EdgeKind, ImportGraph, Language, LocationKind, PyDefinition, Range,
    SymbolLocation, Workspace, insert_import_edge,
};

use super::{SymbolQuery, rank_references, read_lines};

use parse::{RawPyCallee, parse_py_file};

/// Cached structures reusable across runs when fingerprints match.
pub struct PyReuse {
    pub module_map: BTreeMap<String, String>,
    pub definitions: BTreeMap<String, Vec<PyDefinition>>,
    pub import_graph: ImportGraph,
    pub call_expressions: Option<Vec<CallExpression>>,
}

pub struct PyAdapter {
    pub workspace: Workspace,
    files: Vec<String>,
    file_set: HashSet<String>,
    /// Dotted module name -> absolute file path, first-seen wins.
    module_map: BTreeMap<String, String>,
    defs: BTreeMap<String, Vec<PyDefinition>>,
    import_graph: ImportGraph,
    calls: Vec<CallExpression>,
}

impl PyAdapter {
    pub fn build(
        workspace: Workspace,
        repo_root: &str,
        files: Vec<String>,
        import_roots: &[String],
        reuse: Option<PyReuse>,
        need_calls: bool,
    ) -> Self {
        let file_set: HashSet<String> = files.iter().cloned().collect();

        if let Some(cached) = reuse {
            let cached_calls_ok = !need_calls || cached.call_expressions.is_some();
            if cached_calls_ok {
                debug!(workspace = %workspace.id, "replaying cached py index");
                return Self {
                    workspace,
                    files,
                    file_set,
                    module_map: cached.module_map,
                    defs: cached.definitions,
                    import_graph: cached.import_graph,
                    calls: cached.call_expressions.unwrap_or_default(),
                };
            }
        }

        let mut module_map: BTreeMap<String, String> = BTreeMap::new();
        let mut file_modules: HashMap<String, String> = HashMap::new();
        for root in import_roots {
            for path in &files {
                let rel = to_repo_relative(path, &workspace.root);
                let Some(dotted) = dotted_module(&rel, root) else {
                    continue;
                };
                module_map.entry(dotted.clone()).or_insert(path.clone());
                file_modules.entry(path.clone()).or_insert(dotted);
            }
        }

        let mut defs: BTreeMap<String, Vec<PyDefinition>> = BTreeMap::new();
        let mut import_graph = ImportGraph::new();
        let mut raw_calls: Vec<(String, parse::RawPyCall)> = Vec::new();

        for path in &files {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    debug!(%path, %err, "skipping unreadable python file");
                    continue;
                }
            };
            let facts = parse_py_file(&content);
            if !facts.defs.is_empty() {
                defs.insert(path.clone(), facts.defs);
            }
            for import in &facts.imports {
                let candidates = import_candidates(import, file_modules.get(path));
                for candidate in candidates {
                    if let Some(target) = resolve_longest_prefix(&module_map, &candidate)
                        && target != path
                    {
                        insert_import_edge(&mut import_graph, path, target, EdgeKind::Static);
                    }
                }
            }
            for call in facts.calls {
                raw_calls.push((path.clone(), call));
            }
        }

        // Class name -> defining file, for `Class.method()` resolution.
        let mut class_files: BTreeMap<String, String> = BTreeMap::new();
        for (path, file_defs) in &defs {
            for def in file_defs {
                if def.kind == "class" {
                    class_files.entry(def.name.clone()).or_insert(path.clone());
                }
            }
        }

        let calls = raw_calls
            .into_iter()
            .map(|(path, raw)| {
                finalize_call(&path, raw, repo_root, &defs, &class_files)
            })
            .collect();

        Self {
            workspace,
            files,
            file_set,
            module_map,
            defs,
            import_graph,
            calls,
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

    pub fn module_map(&self) -> &BTreeMap<String, String> {
        &self.module_map
    }

    pub fn definitions(&self) -> &BTreeMap<String, Vec<PyDefinition>> {
        &self.defs
    }

    /// Resolve `"module:Name"` or dotted `"pkg.mod.Class.method"` queries:
    /// the longest leading dotted prefix naming a known module selects the
    /// file; the remainder is a name or `Class.member`.
    pub fn find_definitions(&self, query: &str) -> Vec<SymbolLocation> {
        let parsed = SymbolQuery::parse(query);

        // Module hint given as "module:Name".
        if let Some(hint) = &parsed.hint {
            let files: Vec<&String> = self
                .module_map
                .iter()
                .filter(|(module, path)| {
                    module.as_str() == hint.as_str()
                        || module.ends_with(&format!(".{}", hint))
                        || path.contains(hint.as_str())
                })
                .map(|(_, path)| path)
                .collect();
            return self.defs_in_files(&files, &parsed.symbol);
        }

        if parsed.symbol.contains('.') {
            // Longest module prefix wins; remainder is Name or Class.member.
            let components: Vec<&str> = parsed.symbol.split('.').collect();
            for take in (1..components.len()).rev() {
                let module = components[..take].join(".");
                let Some(path) = self.module_map.get(&module) else {
                    continue;
                };
                let remainder = components[take..].join(".");
                return self.defs_in_files(&[path], &remainder);
            }
        }

        let all: Vec<&String> = self.files.iter().collect();
        self.defs_in_files(&all, &parsed.symbol)
    }

    fn defs_in_files(&self, files: &[&String], symbol: &str) -> Vec<SymbolLocation> {
        let (class, member) = match symbol.split_once('.') {
            Some((c, m)) if !c.is_empty() && !m.is_empty() && !m.contains('.') => {
                (Some(c), Some(m))
            }
            _ => (None, None),
        };
        let mut out = Vec::new();
        for path in files {
            let Some(file_defs) = self.defs.get(*path) else {
                continue;
            };
            for def in file_defs {
                let matched = match (class, member) {
                    (Some(c), Some(m)) => {
                        def.class_name.as_deref() == Some(c) && def.name == m
                    }
                    _ => def.name == symbol && def.kind != "method",
                };
                if !matched {
                    continue;
                }
                let symbol_name = match &def.class_name {
                    Some(c) => format!("{}.{}", c, def.name),
                    None => def.name.clone(),
                };
                out.push(SymbolLocation {
                    file_path: (*path).clone(),
                    range: def.range,
                    kind: LocationKind::Definition,
                    language: Language::Py,
                    symbol_name: Some(symbol_name),
                    symbol_position: None,
                });
            }
        }
        out
    }

    /// Textual references to the target's last name component, ranked as in
    /// the TS adapter plus a +60 bonus for the definition's own file.
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
        let pattern = match regex::Regex::new(&format!(r"\b{}\b", regex::escape(name))) {
            Ok(re) => re,
            Err(_) => return Vec::new(),
        };

        let mut hits: Vec<(String, usize)> = Vec::new();
        for path in &self.files {
            let Ok(content) = std::fs::read_to_string(path) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                let line_no = idx + 1;
                if path == &def.file_path && line_no == def.range.start_line {
                    continue;
                }
                if pattern.is_match(line) {
                    hits.push((path.clone(), line_no));
                }
            }
        }

        rank_references(&mut hits, anchor_files, Some(def.file_path.as_str()));
        hits.truncate(limit);
        hits.into_iter()
            .map(|(path, line)| SymbolLocation {
                file_path: path,
                range: Range::lines(line, line).padded(2),
                kind: LocationKind::Reference,
                language: Language::Py,
                symbol_name: def.symbol_name.clone(),
                symbol_position: None,
            })
            .collect()
    }

    pub fn extract_snippet(&self, path: &str, range: Range) -> std::io::Result<String> {
        read_lines(path, range)
    }
}

/// Dotted module name of a workspace-relative path under one import root,
/// stripping `.py` and a trailing `__init__`.
fn dotted_module(rel: &str, root: &str) -> Option<String> {
    let under_root = if root == "." || root.is_empty() {
        rel
    } else {
        rel.strip_prefix(&format!("{}/", root))?
    };
    let without_ext = under_root.strip_suffix(".py")?;
    let mut dotted = without_ext.replace('/', ".");
    if let Some(stripped) = dotted.strip_suffix(".__init__") {
        dotted = stripped.to_string();
    }
    if dotted == "__init__" || dotted.is_empty() {
        return None;
    }
    Some(dotted)
}

/// Absolute dotted candidates for one import statement: `X`, `M`, `M.n…`,
/// with relative levels resolved against the importer's module name.
fn import_candidates(import: &parse::PyImport, current_module: Option<&String>) -> Vec<String> {
    let base = if import.level == 0 {
        import.module.clone()
    } else {
        let Some(current) = current_module else {
            return Vec::new();
        };
        let parts: Vec<&str> = current.split('.').collect();
        if import.level > parts.len() {
            return Vec::new();
        }
        let prefix = parts[..parts.len() - import.level].join(".");
        match (prefix.is_empty(), import.module.is_empty()) {
            (true, _) => import.module.clone(),
            (false, true) => prefix,
            (false, false) => format!("{}.{}", prefix, import.module),
        }
    };

    let mut candidates = Vec::new();
    if !base.is_empty() {
        candidates.push(base.clone());
    }
    for name in &import.names {
        if base.is_empty() {
            candidates.push(name.clone());
        } else {
            candidates.push(format!("{}.{}", base, name));
        }
    }
    candidates
}

/// Longest-prefix match of a dotted candidate against the module map.
fn resolve_longest_prefix<'m>(
    module_map: &'m BTreeMap<String, String>,
    candidate: &str,
) -> Option<&'m String> {
    let mut parts: Vec<&str> = candidate.split('.').collect();
    while !parts.is_empty() {
        if let Some(path) = module_map.get(&parts.join(".")) {
            return Some(path);
        }
        parts.pop();
    }
    None
}

fn finalize_call(
    path: &str,
    raw: parse::RawPyCall,
    repo_root: &str,
    defs: &BTreeMap<String, Vec<PyDefinition>>,
    class_files: &BTreeMap<String, String>,
) -> CallExpression {
    let rel = to_repo_relative(path, repo_root);
    let (callee_symbol, confidence, is_dynamic) = match &raw.callee {
        RawPyCallee::Bare(name) => {
            let local = defs
                .get(path)
                .is_some_and(|file_defs| file_defs.iter().any(|d| d.name == *name && d.kind != "method"));
            if local {
                (format!("{}#{}", rel, name), 1.0, false)
            } else {
                (name.clone(), 0.8, false)
            }
        }
        RawPyCallee::Chain(parts) => {
            let head = parts[0].as_str();
            if (head == "self" || head == "cls")
                && let Some(class) = &raw.enclosing_class
                && parts.len() >= 2
            {
                (format!("{}#{}.{}", rel, class, parts[1]), 1.0, false)
            } else if let Some(class_file) = class_files.get(head)
                && parts.len() >= 2
            {
                (
                    format!(
                        "{}#{}.{}",
                        to_repo_relative(class_file, repo_root),
                        head,
                        parts[1]
                    ),
                    1.0,
                    false,
                )
            } else {
                (parts.join("."), 0.6, true)
            }
        }
        RawPyCallee::Subscript => ("[dynamic]".to_string(), 0.3, true),
    };
    CallExpression {
        caller_file: path.to_string(),
        caller_symbol: raw.caller,
        callee_symbol,
        range: Range::lines(raw.line, raw.line),
        confidence,
        is_dynamic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::canonicalize_logical;
    use crate::types::WorkspaceKind;
    use tempfile::TempDir;

    fn build(dir: &TempDir, sources: &[(&str, &str)]) -> PyAdapter {
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
            name: "pyfixture".to_string(),
            root: root.clone(),
            kind: WorkspaceKind::Python,
        };
        let roots = vec!["src".to_string(), ".".to_string()];
        PyAdapter::build(ws, &root, files, &roots, None, true)
    }

    #[test]
    fn module_map_strips_roots_and_init() {
        let dir = TempDir::new().expect("tempdir");
        let adapter = build(
            &dir,
            &[
                ("src/pkg/__init__.py", ""),
                ("src/pkg/core.py", "def run():\n    pass\n"),
                ("tools/cli.py", "def main():\n    pass\n"),
            ],
        );
        assert!(adapter.module_map().contains_key("pkg"));
        assert!(adapter.module_map().contains_key("pkg.core"));
        assert!(adapter.module_map().contains_key("tools.cli"));
    }

    #[test]
    fn from_import_resolves_module_and_members() {
        let dir = TempDir::new().expect("tempdir");
        let adapter = build(
            &dir,
            &[
                ("src/pkg/__init__.py", ""),
                ("src/pkg/core.py", "def run():\n    pass\n"),
                ("src/app.py", "from pkg import core\ncore.run()\n"),
            ],
        );
        let from = adapter
            .files()
            .iter()
            .find(|f| f.ends_with("app.py"))
            .expect("app.py")
            .clone();
        let targets = &adapter.import_graph()[&from];
        // Candidates {pkg, pkg.core} resolve to both files.
        assert_eq!(targets.len(), 2);
        assert!(targets.values().all(|k| *k == EdgeKind::Static));
    }

    #[test]
    fn relative_import_resolution() {
        let dir = TempDir::new().expect("tempdir");
        let adapter = build(
            &dir,
            &[
                ("src/pkg/__init__.py", ""),
                ("src/pkg/util.py", "def helper():\n    pass\n"),
                ("src/pkg/mod.py", "from .util import helper\n"),
            ],
        );
        let from = adapter
            .files()
            .iter()
            .find(|f| f.ends_with("mod.py"))
            .expect("mod.py")
            .clone();
        let targets = &adapter.import_graph()[&from];
        assert!(targets.keys().any(|t| t.ends_with("util.py")));
    }

    #[test]
    fn dotted_symbol_query() {
        let dir = TempDir::new().expect("tempdir");
        let adapter = build(
            &dir,
            &[(
                "src/pkg/service.py",
                "class Service:\n    def start(self):\n        pass\n",
            )],
        );
        let defs = adapter.find_definitions("pkg.service.Service.start");
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].symbol_name.as_deref(), Some("Service.start"));

        let hinted = adapter.find_definitions("service:Service");
        assert_eq!(hinted.len(), 1);
    }

    #[test]
    fn self_and_class_calls_resolve() {
        let dir = TempDir::new().expect("tempdir");
        let adapter = build(
            &dir,
            &[
                (
                    "src/svc.py",
                    "class Service:\n    def run(self):\n        self.step()\n    def step(self):\n        pass\n",
                ),
                ("src/use.py", "Service.run(None)\n"),
            ],
        );
        assert!(adapter.call_expressions().iter().any(|c| {
            c.callee_symbol == "src/svc.py#Service.step" && c.confidence == 1.0
        }));
        // Class.method() from another module resolves to the class file.
        assert!(adapter.call_expressions().iter().any(|c| {
            c.callee_symbol == "src/svc.py#Service.run" && c.caller_file.ends_with("use.py")
        }));
    }

    #[test]
    fn references_rank_definition_file_first() {
        let dir = TempDir::new().expect("tempdir");
        let adapter = build(
            &dir,
            &[
                (
                    "src/lib.py",
                    "def widget():\n    pass\n\nwidget()\n",
                ),
                ("src/use.py", "from lib import widget\nwidget()\n"),
            ],
        );
        let defs = adapter.find_definitions("widget");
        assert_eq!(defs.len(), 1);
        let refs = adapter.find_references(&defs[0], 10, &HashSet::new());
        assert!(!refs.is_empty());
        assert!(refs[0].file_path.ends_with("lib.py"));
    }
}
