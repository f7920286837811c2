//! Per-file TS/JS extraction using the OXC AST.
//!
//! One pass over the program body collects top-level declarations, import
//! bindings, and named scopes; a semantic pass resolves bindings and
//! reference usage sites; a `Visit` traversal then collects dynamic
//! imports and call/new expressions anywhere in the tree. Trees are dropped
//! as soon as the extracted facts are owned.

use std::collections::{HashMap, HashSet};

use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_ast_visit::{Visit, walk};
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{SourceType, Span};

use crate::paths::{extension, to_repo_relative};
use crate::types::{CallExpression as Call, EdgeKind, Range};

use super::TsDefinition;
use super::resolve::TsResolver;

/// Everything the adapter keeps from one parsed file.
pub(crate) struct FileFacts {
    /// Resolved absolute import targets with their edge kind.
    pub imports: Vec<(String, EdgeKind)>,
    pub defs: Vec<TsDefinition>,
    pub calls: Vec<Call>,
    /// Resolved reference sites as `(symbol name, line)`, deduplicated.
    pub usages: Vec<(String, usize)>,
    pub parse_errors: usize,
}

/// Cap on recorded usage sites per file.
const MAX_USAGES_PER_FILE: usize = 1500;

struct ImportBinding {
    resolved: Option<String>,
    imported: String,
}

/// A named enclosing scope used for caller-symbol attribution.
struct Scope {
    start: u32,
    end: u32,
    symbol: String,
}

/// How a callee was classified before caller attribution.
enum RawCallee {
    Resolved {
        symbol: String,
        confidence: f32,
        is_dynamic: bool,
    },
    /// `this.<member>()`; the class comes from the enclosing scope.
    ThisMember(String),
}

struct RawCall {
    callee: RawCallee,
    span: Span,
}

pub(crate) fn extract_file_facts(
    content: &str,
    path_abs: &str,
    repo_root: &str,
    resolver: &TsResolver,
) -> FileFacts {
    let allocator = Allocator::default();
    let ext = extension(path_abs);
    let is_jsx = ext == "tsx" || ext == "jsx";
    let source_type = SourceType::from_path(std::path::Path::new(path_abs))
        .unwrap_or_default()
        .with_typescript(true)
        .with_jsx(is_jsx);
    let ret = Parser::new(&allocator, content, source_type).parse();

    let mut top = TopLevel {
        path_abs,
        repo_root,
        resolver,
        source_text: content,
        rel: to_repo_relative(path_abs, repo_root),
        imports: Vec::new(),
        bindings: HashMap::new(),
        local_names: HashSet::new(),
        local_classes: HashSet::new(),
        scopes: Vec::new(),
        defs: Vec::new(),
    };
    for stmt in &ret.program.body {
        top.collect_statement(stmt);
    }

    // Semantic pass: declared bindings feed callee resolution, resolved
    // references become the usage table behind reference lookup.
    let mut usages: Vec<(String, usize)> = Vec::new();
    let semantic_ret = SemanticBuilder::new().build(&ret.program);
    if semantic_ret.errors.is_empty() {
        let semantic = semantic_ret.semantic;
        let mut seen_uses: HashSet<(String, usize)> = HashSet::new();
        for symbol_id in semantic.scoping().symbol_ids() {
            let name = semantic.scoping().symbol_name(symbol_id);
            if name.is_empty() {
                continue;
            }
            // Import bindings stay in the binding map; everything else is a
            // declaration this file can resolve calls against.
            if !top.bindings.contains_key(name) {
                top.local_names.insert(name.to_string());
            }
            for reference in semantic.symbol_references(symbol_id) {
                if usages.len() >= MAX_USAGES_PER_FILE {
                    break;
                }
                let line = top.line_of(semantic.reference_span(reference).start);
                if line == 0 {
                    continue;
                }
                if seen_uses.insert((name.to_string(), line)) {
                    usages.push((name.to_string(), line));
                }
            }
        }
    }

    let mut collector = CallCollector {
        top: &top,
        instance_of: HashMap::new(),
        raw_calls: Vec::new(),
        dynamic_imports: Vec::new(),
        type_imports: Vec::new(),
    };
    collector.visit_program(&ret.program);

    let mut imports = top.imports.clone();
    for spec in &collector.type_imports {
        // Type-only import("M") is a static dependency.
        if let Some(resolved) = resolver.resolve(spec, path_abs) {
            imports.push((resolved, EdgeKind::Static));
        }
    }
    for spec in &collector.dynamic_imports {
        if let Some(resolved) = resolver.resolve(spec, path_abs) {
            imports.push((resolved, EdgeKind::Dynamic));
        }
    }

    let mut raw_calls = collector.raw_calls;
    raw_calls.sort_by_key(|c| (c.span.start, c.span.end));

    let calls = raw_calls
        .into_iter()
        .map(|raw| {
            let caller_symbol = top.enclosing_scope(raw.span.start);
            let (callee_symbol, confidence, is_dynamic) = match raw.callee {
                RawCallee::Resolved {
                    symbol,
                    confidence,
                    is_dynamic,
                } => (symbol, confidence, is_dynamic),
                RawCallee::ThisMember(prop) => match caller_symbol
                    .as_deref()
                    .and_then(|s| s.split('.').next())
                    .filter(|class| top.local_classes.contains(*class))
                {
                    Some(class) => (format!("{}#{}.{}", top.rel, class, prop), 1.0, false),
                    None => (format!("this.{}", prop), 0.6, true),
                },
            };
            Call {
                caller_file: path_abs.to_string(),
                caller_symbol,
                callee_symbol,
                range: top.span_range(raw.span),
                confidence,
                is_dynamic,
            }
        })
        .collect();

    FileFacts {
        imports,
        defs: top.defs,
        calls,
        usages,
        parse_errors: ret.errors.len(),
    }
}

struct TopLevel<'a> {
    path_abs: &'a str,
    repo_root: &'a str,
    resolver: &'a TsResolver,
    source_text: &'a str,
    rel: String,
    imports: Vec<(String, EdgeKind)>,
    bindings: HashMap<String, ImportBinding>,
    local_names: HashSet<String>,
    local_classes: HashSet<String>,
    scopes: Vec<Scope>,
    defs: Vec<TsDefinition>,
}

impl<'a> TopLevel<'a> {
    fn line_of(&self, offset: u32) -> usize {
        let capped = (offset as usize).min(self.source_text.len());
        self.source_text[..capped]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
            + 1
    }

    fn span_range(&self, span: Span) -> Range {
        Range::lines(self.line_of(span.start), self.line_of(span.end))
    }

    fn enclosing_scope(&self, offset: u32) -> Option<String> {
        self.scopes
            .iter()
            .filter(|s| s.start <= offset && offset < s.end)
            .max_by_key(|s| s.start)
            .map(|s| s.symbol.clone())
    }

    fn rel_of(&self, abs: &str) -> String {
        to_repo_relative(abs, self.repo_root)
    }

    fn add_static_import(&mut self, spec: &str) {
        if let Some(resolved) = self.resolver.resolve(spec, self.path_abs) {
            self.imports.push((resolved, EdgeKind::Static));
        }
    }

    fn push_def(
        &mut self,
        name: &str,
        kind: &str,
        span: Span,
        symbol_position: u32,
        class_name: Option<&str>,
    ) {
        self.defs.push(TsDefinition {
            name: name.to_string(),
            kind: kind.to_string(),
            range: self.span_range(span),
            symbol_position: symbol_position as usize,
            class_name: class_name.map(|s| s.to_string()),
        });
    }

    fn collect_statement(&mut self, stmt: &Statement<'a>) {
        match stmt {
            Statement::ImportDeclaration(decl) => self.collect_import(decl),
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(src) = &decl.source {
                    self.add_static_import(&src.value);
                }
                if let Some(declaration) = &decl.declaration {
                    self.collect_declaration(declaration);
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                self.add_static_import(&decl.source.value);
            }
            Statement::ExportDefaultDeclaration(decl) => self.collect_default_export(decl),
            Statement::TSExportAssignment(decl) => {
                self.push_def("default", "default", decl.span, decl.span.start, None);
            }
            Statement::TSImportEqualsDeclaration(decl) => {
                // import x = require("m") is a dynamic edge.
                if let TSModuleReference::ExternalModuleReference(ext) = &decl.module_reference
                    && let Some(resolved) =
                        self.resolver.resolve(&ext.expression.value, self.path_abs)
                {
                    self.imports.push((resolved, EdgeKind::Dynamic));
                }
            }
            Statement::FunctionDeclaration(f) => self.collect_function(f, false),
            Statement::ClassDeclaration(c) => self.collect_class(c, false),
            Statement::TSInterfaceDeclaration(i) => {
                self.local_names.insert(i.id.name.to_string());
                self.push_def(&i.id.name, "interface", i.span, i.id.span.start, None);
            }
            Statement::TSTypeAliasDeclaration(t) => {
                self.local_names.insert(t.id.name.to_string());
                self.push_def(&t.id.name, "type", t.span, t.id.span.start, None);
            }
            Statement::TSEnumDeclaration(e) => {
                self.local_names.insert(e.id.name.to_string());
                self.push_def(&e.id.name, "enum", e.span, e.id.span.start, None);
            }
            Statement::VariableDeclaration(var) => self.collect_variables(var),
            _ => {}
        }
    }

    fn collect_declaration(&mut self, declaration: &Declaration<'a>) {
        match declaration {
            Declaration::FunctionDeclaration(f) => self.collect_function(f, false),
            Declaration::ClassDeclaration(c) => self.collect_class(c, false),
            Declaration::TSInterfaceDeclaration(i) => {
                self.local_names.insert(i.id.name.to_string());
                self.push_def(&i.id.name, "interface", i.span, i.id.span.start, None);
            }
            Declaration::TSTypeAliasDeclaration(t) => {
                self.local_names.insert(t.id.name.to_string());
                self.push_def(&t.id.name, "type", t.span, t.id.span.start, None);
            }
            Declaration::TSEnumDeclaration(e) => {
                self.local_names.insert(e.id.name.to_string());
                self.push_def(&e.id.name, "enum", e.span, e.id.span.start, None);
            }
            Declaration::VariableDeclaration(var) => self.collect_variables(var),
            _ => {}
        }
    }

    fn collect_default_export(&mut self, decl: &ExportDefaultDeclaration<'a>) {
        match &decl.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(f) => self.collect_function(f, true),
            ExportDefaultDeclarationKind::ClassDeclaration(c) => self.collect_class(c, true),
            _ => {
                self.push_def("default", "default", decl.span, decl.span.start, None);
            }
        }
    }

    fn collect_import(&mut self, decl: &ImportDeclaration<'a>) {
        let source = decl.source.value.to_string();
        let resolved = self.resolver.resolve(&source, self.path_abs);
        if let Some(target) = &resolved {
            // Type-only imports are still static dependencies.
            self.imports.push((target.clone(), EdgeKind::Static));
        }
        let Some(specifiers) = &decl.specifiers else {
            return;
        };
        for spec in specifiers {
            let (local, imported) = match spec {
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                    (s.local.name.to_string(), "default".to_string())
                }
                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                    let imported = match &s.imported {
                        ModuleExportName::IdentifierName(id) => id.name.to_string(),
                        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
                        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
                    };
                    (s.local.name.to_string(), imported)
                }
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                    (s.local.name.to_string(), "*".to_string())
                }
            };
            self.bindings.insert(
                local,
                ImportBinding {
                    resolved: resolved.clone(),
                    imported,
                },
            );
        }
    }

    fn collect_function(&mut self, f: &Function<'a>, default_export: bool) {
        let (name, position) = match &f.id {
            Some(id) => (id.name.to_string(), id.span.start),
            None => ("default".to_string(), f.span.start),
        };
        self.local_names.insert(name.clone());
        self.push_def(&name, "function", f.span, position, None);
        if default_export && name != "default" {
            self.push_def("default", "default", f.span, position, None);
        }
        self.scopes.push(Scope {
            start: f.span.start,
            end: f.span.end,
            symbol: name,
        });
    }

    fn collect_class(&mut self, c: &Class<'a>, default_export: bool) {
        let (name, position) = match &c.id {
            Some(id) => (id.name.to_string(), id.span.start),
            None => ("default".to_string(), c.span.start),
        };
        self.local_names.insert(name.clone());
        self.local_classes.insert(name.clone());
        self.push_def(&name, "class", c.span, position, None);
        if default_export && name != "default" {
            self.push_def("default", "default", c.span, position, None);
        }

        for element in &c.body.body {
            match element {
                ClassElement::MethodDefinition(m) => {
                    let Some(key) = prop_key_name(&m.key) else {
                        continue;
                    };
                    let (member, kind) = match m.kind {
                        MethodDefinitionKind::Constructor => {
                            ("constructor".to_string(), "constructor")
                        }
                        MethodDefinitionKind::Get | MethodDefinitionKind::Set => (key, "accessor"),
                        _ => (key, "method"),
                    };
                    self.push_def(&member, kind, m.span, m.span.start, Some(&name));
                    self.scopes.push(Scope {
                        start: m.span.start,
                        end: m.span.end,
                        symbol: format!("{}.{}", name, member),
                    });
                }
                ClassElement::PropertyDefinition(p) => {
                    let Some(key) = prop_key_name(&p.key) else {
                        continue;
                    };
                    self.push_def(&key, "property", p.span, p.span.start, Some(&name));
                    if matches!(
                        p.value,
                        Some(Expression::ArrowFunctionExpression(_))
                            | Some(Expression::FunctionExpression(_))
                    ) {
                        self.scopes.push(Scope {
                            start: p.span.start,
                            end: p.span.end,
                            symbol: format!("{}.{}", name, key),
                        });
                    }
                }
                ClassElement::AccessorProperty(p) => {
                    if let Some(key) = prop_key_name(&p.key) {
                        self.push_def(&key, "accessor", p.span, p.span.start, Some(&name));
                    }
                }
                _ => {}
            }
        }
    }

    fn collect_variables(&mut self, var: &VariableDeclaration<'a>) {
        for d in &var.declarations {
            let BindingPattern::BindingIdentifier(id) = &d.id else {
                continue;
            };
            let name = id.name.to_string();
            self.local_names.insert(name.clone());
            self.push_def(&name, "variable", d.span, id.span.start, None);
            if matches!(
                d.init,
                Some(Expression::ArrowFunctionExpression(_))
                    | Some(Expression::FunctionExpression(_))
            ) {
                self.scopes.push(Scope {
                    start: d.span.start,
                    end: d.span.end,
                    symbol: name,
                });
            }
        }
    }
}

/// Join a static member chain (`a.b.c`) into its dotted form. Returns None
/// when the base is not an identifier or `this`.
fn member_chain(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(id) => Some(id.name.to_string()),
        Expression::ThisExpression(_) => Some("this".to_string()),
        Expression::StaticMemberExpression(member) => {
            let base = member_chain(&member.object)?;
            Some(format!("{}.{}", base, member.property.name))
        }
        _ => None,
    }
}

fn prop_key_name(key: &PropertyKey) -> Option<String> {
    match key {
        PropertyKey::Identifier(id) => Some(id.name.to_string()),
        PropertyKey::StringLiteral(lit) => Some(lit.value.to_string()),
        _ => None,
    }
}

struct CallCollector<'a, 'ctx> {
    top: &'ctx TopLevel<'a>,
    /// Variable name -> class name, from `const x = new Foo()`, in document
    /// order so uses after the declaration resolve.
    instance_of: HashMap<String, String>,
    raw_calls: Vec<RawCall>,
    dynamic_imports: Vec<String>,
    type_imports: Vec<String>,
}

impl<'a> CallCollector<'a, '_> {
    /// Classify a call/new callee per the resolution table.
    fn classify_callee(&self, callee: &Expression<'a>) -> RawCallee {
        match callee {
            Expression::Identifier(ident) => {
                let name = ident.name.to_string();
                if self.top.local_names.contains(&name) {
                    return RawCallee::Resolved {
                        symbol: format!("{}#{}", self.top.rel, name),
                        confidence: 1.0,
                        is_dynamic: false,
                    };
                }
                if let Some(binding) = self.top.bindings.get(&name)
                    && let Some(resolved) = &binding.resolved
                {
                    let target = if binding.imported == "*" {
                        name.clone()
                    } else {
                        binding.imported.clone()
                    };
                    return RawCallee::Resolved {
                        symbol: format!("{}#{}", self.top.rel_of(resolved), target),
                        confidence: 1.0,
                        is_dynamic: false,
                    };
                }
                RawCallee::Resolved {
                    symbol: name,
                    confidence: 0.8,
                    is_dynamic: false,
                }
            }
            Expression::StaticMemberExpression(member) => {
                let prop = member.property.name.to_string();
                match &member.object {
                    Expression::ThisExpression(_) => RawCallee::ThisMember(prop),
                    Expression::Identifier(obj) => self.classify_member(obj.name.as_str(), &prop),
                    Expression::StaticMemberExpression(_) => match member_chain(callee) {
                        Some(chain) => RawCallee::Resolved {
                            symbol: chain,
                            confidence: 0.6,
                            is_dynamic: true,
                        },
                        None => RawCallee::Resolved {
                            symbol: "[dynamic]".to_string(),
                            confidence: 0.3,
                            is_dynamic: true,
                        },
                    },
                    _ => RawCallee::Resolved {
                        symbol: "[dynamic]".to_string(),
                        confidence: 0.3,
                        is_dynamic: true,
                    },
                }
            }
            Expression::ComputedMemberExpression(_) => RawCallee::Resolved {
                symbol: "[dynamic]".to_string(),
                confidence: 0.3,
                is_dynamic: true,
            },
            _ => RawCallee::Resolved {
                symbol: "[dynamic]".to_string(),
                confidence: 0.3,
                is_dynamic: true,
            },
        }
    }

    fn classify_member(&self, obj: &str, prop: &str) -> RawCallee {
        // Local class: Class.method().
        if self.top.local_classes.contains(obj) {
            return RawCallee::Resolved {
                symbol: format!("{}#{}.{}", self.top.rel, obj, prop),
                confidence: 1.0,
                is_dynamic: false,
            };
        }
        // Instance with a known class: svc.start() after `svc = new Service()`.
        if let Some(class) = self.instance_of.get(obj) {
            if self.top.local_classes.contains(class) {
                return RawCallee::Resolved {
                    symbol: format!("{}#{}.{}", self.top.rel, class, prop),
                    confidence: 1.0,
                    is_dynamic: false,
                };
            }
            if let Some(binding) = self.top.bindings.get(class)
                && let Some(resolved) = &binding.resolved
            {
                return RawCallee::Resolved {
                    symbol: format!("{}#{}.{}", self.top.rel_of(resolved), class, prop),
                    confidence: 1.0,
                    is_dynamic: false,
                };
            }
            // Known type name, unknown declaration site.
            return RawCallee::Resolved {
                symbol: format!("{}.{}", class, prop),
                confidence: 1.0,
                is_dynamic: false,
            };
        }
        if let Some(binding) = self.top.bindings.get(obj)
            && let Some(resolved) = &binding.resolved
        {
            if binding.imported == "*" {
                // Namespace member is a top-level symbol of the target.
                return RawCallee::Resolved {
                    symbol: format!("{}#{}", self.top.rel_of(resolved), prop),
                    confidence: 1.0,
                    is_dynamic: false,
                };
            }
            if binding
                .imported
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_uppercase())
            {
                return RawCallee::Resolved {
                    symbol: format!(
                        "{}#{}.{}",
                        self.top.rel_of(resolved),
                        binding.imported,
                        prop
                    ),
                    confidence: 1.0,
                    is_dynamic: false,
                };
            }
        }
        RawCallee::Resolved {
            symbol: format!("{}.{}", obj, prop),
            confidence: 0.6,
            is_dynamic: true,
        }
    }
}

impl<'a> Visit<'a> for CallCollector<'a, '_> {
    fn visit_import_expression(&mut self, expr: &ImportExpression<'a>) {
        if let Expression::StringLiteral(s) = &expr.source {
            self.dynamic_imports.push(s.value.to_string());
        }
        self.visit_expression(&expr.source);
        if let Some(opts) = &expr.options {
            self.visit_expression(opts);
        }
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        self.visit_arguments(&call.arguments);
        self.visit_expression(&call.callee);

        // require("m") contributes a dynamic import edge besides the call.
        if let Expression::Identifier(ident) = &call.callee
            && ident.name == "require"
            && let Some(Argument::StringLiteral(s)) = call.arguments.first()
        {
            self.dynamic_imports.push(s.value.to_string());
        }

        let callee = self.classify_callee(&call.callee);
        self.raw_calls.push(RawCall {
            callee,
            span: call.span,
        });
    }

    fn visit_expression(&mut self, expr: &Expression<'a>) {
        if let Expression::NewExpression(new_expr) = expr {
            let callee = self.classify_callee(&new_expr.callee);
            self.raw_calls.push(RawCall {
                callee,
                span: new_expr.span,
            });
        }
        walk::walk_expression(self, expr);
    }

    fn visit_variable_declarator(&mut self, decl: &VariableDeclarator<'a>) {
        if let BindingPattern::BindingIdentifier(id) = &decl.id
            && let Some(Expression::NewExpression(new_expr)) = &decl.init
            && let Expression::Identifier(callee) = &new_expr.callee
        {
            self.instance_of
                .insert(id.name.to_string(), callee.name.to_string());
        }
        self.visit_binding_pattern(&decl.id);
        if let Some(init) = &decl.init {
            self.visit_expression(init);
        }
    }

    fn visit_ts_import_type(&mut self, it: &TSImportType<'a>) {
        self.type_imports.push(it.source.value.to_string());
        walk::walk_ts_import_type(self, it);
    }
}
