//! Python language support.
//!
//! Implements the [`Language`] trait for Python using tree-sitter-python:
//! function/class discovery via cached queries, statement lowering with
//! read/write/call fact extraction, and per-function CFG construction
//! with branch, loop, and exception-handler edges.
//!
//! Exception-handler edges are first-class here: resource-leak and
//! empty-catch detection hinge on knowing that any statement inside a
//! `try` suite may transfer control to its handlers.

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, QueryCursor, Tree};

use crate::error::{HoundError, Result};
use crate::lang::traits::Language;
use crate::model::types::{
    CallArg, CallSite, Cfg, CfgEdge, ClassDecl, EdgeKind, FunctionModel, ImportDecl, ImportedName,
    ModuleBinding, SourceUnit, Statement, StmtId, StmtKind, WithItem,
};

/// Maximum stored snippet length for a statement's `text` field.
const MAX_SNIPPET_LEN: usize = 160;

/// Python language implementation.
pub struct Python;

impl Language for Python {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".py", ".pyi"]
    }

    fn parser(&self) -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| HoundError::TreeSitter(e.to_string()))?;
        Ok(parser)
    }

    fn lower(&self, tree: &Tree, source: &[u8], path: &str) -> Result<SourceUnit> {
        let root = tree.root_node();

        let mut unit = SourceUnit {
            path: path.to_string(),
            language: "python".to_string(),
            imports: Vec::new(),
            bindings: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            module_statements: Vec::new(),
        };

        // Module-level walk: imports, bindings, classes, loose statements.
        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            Self::lower_module_item(child, source, &mut unit);
        }

        // Function discovery via the cached query; methods get qualified
        // names from their enclosing class.
        let query_str = r#"(function_definition name: (identifier) @name) @function"#;
        let ts_lang = tree.language();
        let query = super::get_cached_query(&ts_lang, "python", "function", query_str)?;

        let mut qcursor = QueryCursor::new();
        let mut matches = qcursor.matches(&query, root, source);
        while let Some(m) = matches.next() {
            let func_node = m
                .captures
                .iter()
                .find(|c| query.capture_names()[c.index as usize] == "function")
                .map(|c| c.node);
            let Some(func_node) = func_node else { continue };

            // Only top-level functions and class methods; nested closures
            // stay part of their parent's body.
            if let Some(class_name) = Self::enclosing_context(func_node, source) {
                let function = Self::lower_function(func_node, source, class_name.as_deref())?;
                unit.functions.push(function);
            }
        }

        unit.functions.sort_by_key(|f| f.line_start);
        Ok(unit)
    }

    fn content_score(&self, content: &str) -> u32 {
        let mut score = 0u32;
        for line in content.lines().take(400) {
            let trimmed = line.trim_start();
            if trimmed.starts_with("def ") || trimmed.starts_with("async def ") {
                score += 4;
            }
            if trimmed.starts_with("class ") && trimmed.ends_with(':') {
                score += 3;
            }
            if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
                score += 2;
            }
            if trimmed.starts_with("elif ") || trimmed.starts_with("except") {
                score += 3;
            }
            if trimmed.starts_with('#') {
                score += 1;
            }
            if trimmed.contains("self.") {
                score += 1;
            }
            // Statement terminators count against Python.
            if trimmed.ends_with(';') || trimmed.ends_with('{') {
                score = score.saturating_sub(2);
            }
        }
        score
    }
}

// =============================================================================
// Node helpers
// =============================================================================

impl Python {
    /// Get text from a node, handling UTF-8 safely.
    fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
        std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
    }

    /// First line of a node's text, trimmed and truncated.
    fn snippet(node: Node, source: &[u8]) -> String {
        let text = Self::node_text(node, source);
        let first = text.lines().next().unwrap_or("").trim();
        if first.len() > MAX_SNIPPET_LEN {
            first.chars().take(MAX_SNIPPET_LEN).collect()
        } else {
            first.to_string()
        }
    }

    /// Find first child with the given kind.
    fn child_by_kind<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).find(|c| c.kind() == kind);
        found
    }

    /// Determine the lowering context of a function node.
    ///
    /// Returns `Some(None)` for top-level functions, `Some(Some(class))`
    /// for methods, and `None` for functions nested inside another
    /// function (not lowered separately).
    fn enclosing_context(node: Node, source: &[u8]) -> Option<Option<String>> {
        let mut class_name = None;
        let mut current = node.parent();
        while let Some(parent) = current {
            match parent.kind() {
                "function_definition" => return None,
                "class_definition" => {
                    if class_name.is_none() {
                        class_name = parent
                            .child_by_field_name("name")
                            .map(|n| Self::node_text(n, source).to_string());
                    }
                }
                _ => {}
            }
            current = parent.parent();
        }
        Some(class_name)
    }
}

// =============================================================================
// Module-level lowering
// =============================================================================

impl Python {
    fn lower_module_item(node: Node, source: &[u8], unit: &mut SourceUnit) {
        match node.kind() {
            "import_statement" => Self::extract_import(node, source, unit),
            "import_from_statement" => Self::extract_from_import(node, source, unit),
            "class_definition" => {
                if let Some(name) = node.child_by_field_name("name") {
                    unit.classes.push(ClassDecl {
                        name: Self::node_text(name, source).to_string(),
                        line: node.start_position().row + 1,
                    });
                }
            }
            "decorated_definition" => {
                // Recurse into the wrapped definition for class records;
                // functions are discovered separately by query.
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "class_definition" {
                        Self::lower_module_item(child, source, unit);
                    }
                }
            }
            "function_definition" => {} // handled by the function query
            "expression_statement" | "if_statement" | "for_statement" | "while_statement"
            | "try_statement" | "with_statement" => {
                // Module bindings come from plain assignments; everything
                // else still becomes a module statement so module-scope
                // call sites (thread spawns, registrations) are visible.
                if node.kind() == "expression_statement" {
                    if let Some(assign) = Self::child_by_kind(node, "assignment") {
                        Self::extract_module_binding(assign, source, unit);
                    }
                }
                let id = StmtId(unit.module_statements.len());
                let stmt = Self::make_statement(node, source, id);
                unit.module_statements.push(stmt);
            }
            _ => {}
        }
    }

    fn extract_module_binding(assign: Node, source: &[u8], unit: &mut SourceUnit) {
        let Some(left) = assign.child_by_field_name("left") else { return };
        let Some(right) = assign.child_by_field_name("right") else { return };
        if left.kind() == "identifier" {
            unit.bindings.push(ModuleBinding {
                name: Self::node_text(left, source).to_string(),
                init: Self::node_text(right, source).trim().to_string(),
                line: assign.start_position().row + 1,
            });
        }
    }

    /// `import a.b` / `import a.b as c`
    fn extract_import(node: Node, source: &[u8], unit: &mut SourceUnit) {
        let line = node.start_position().row + 1;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" => unit.imports.push(ImportDecl {
                    module: Self::node_text(child, source).to_string(),
                    alias: None,
                    names: Vec::new(),
                    line,
                }),
                "aliased_import" => {
                    let module = child
                        .child_by_field_name("name")
                        .map(|n| Self::node_text(n, source).to_string())
                        .unwrap_or_default();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| Self::node_text(n, source).to_string());
                    unit.imports.push(ImportDecl {
                        module,
                        alias,
                        names: Vec::new(),
                        line,
                    });
                }
                _ => {}
            }
        }
    }

    /// `from mod import a, b as c` / `from mod import *`
    fn extract_from_import(node: Node, source: &[u8], unit: &mut SourceUnit) {
        let line = node.start_position().row + 1;
        let module = node
            .child_by_field_name("module_name")
            .map(|n| Self::node_text(n, source).to_string())
            .unwrap_or_default();

        let mut names = Vec::new();
        let mut cursor = node.walk();
        let mut past_import = false;
        for child in node.children(&mut cursor) {
            if child.kind() == "import" {
                past_import = true;
                continue;
            }
            if !past_import {
                continue;
            }
            match child.kind() {
                "dotted_name" | "identifier" => names.push(ImportedName {
                    name: Self::node_text(child, source).to_string(),
                    alias: None,
                }),
                "aliased_import" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| Self::node_text(n, source).to_string())
                        .unwrap_or_default();
                    let alias = child
                        .child_by_field_name("alias")
                        .map(|n| Self::node_text(n, source).to_string());
                    names.push(ImportedName { name, alias });
                }
                "wildcard_import" => names.push(ImportedName {
                    name: "*".to_string(),
                    alias: None,
                }),
                _ => {}
            }
        }

        unit.imports.push(ImportDecl {
            module,
            alias: None,
            names,
            line,
        });
    }
}

// =============================================================================
// Function lowering
// =============================================================================

impl Python {
    fn lower_function(node: Node, source: &[u8], class_name: Option<&str>) -> Result<FunctionModel> {
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(n, source).to_string())
            .unwrap_or_else(|| "<lambda>".to_string());
        let qualified_name = match class_name {
            Some(class) => format!("{class}.{name}"),
            None => name.clone(),
        };

        let (params, param_exprs) = node
            .child_by_field_name("parameters")
            .map(|p| Self::extract_parameters(p, source))
            .unwrap_or_default();

        let decorators = Self::extract_decorators(node, source);
        let is_async = Self::node_text(node, source).starts_with("async ");

        let mut lowerer = PyLowerer::new(source);
        if let Some(body) = node.child_by_field_name("body") {
            let dangling = lowerer.process_block(body, vec![]);
            lowerer.finish(dangling);
        }

        let global_names = lowerer.global_names.clone();
        let (statements, cfg) = lowerer.into_parts();

        Ok(FunctionModel {
            name,
            qualified_name,
            params,
            param_exprs,
            decorators,
            is_async,
            line_start: node.start_position().row + 1,
            line_end: node.end_position().row + 1,
            statements,
            cfg,
            global_names,
        })
    }

    fn extract_parameters(params_node: Node, source: &[u8]) -> (Vec<String>, Vec<String>) {
        let mut params = Vec::new();
        let mut exprs = Vec::new();
        let mut cursor = params_node.walk();
        for child in params_node.children(&mut cursor) {
            match child.kind() {
                "identifier" => {
                    params.push(Self::node_text(child, source).to_string());
                    exprs.push(String::new());
                }
                "typed_parameter" => {
                    let name = Self::child_by_kind(child, "identifier")
                        .map(|n| Self::node_text(n, source).to_string())
                        .unwrap_or_default();
                    let ty = child
                        .child_by_field_name("type")
                        .map(|n| Self::node_text(n, source).to_string())
                        .unwrap_or_default();
                    params.push(name);
                    exprs.push(ty);
                }
                "default_parameter" | "typed_default_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .map(|n| Self::node_text(n, source).to_string())
                        .unwrap_or_default();
                    let value = child
                        .child_by_field_name("value")
                        .map(|n| Self::node_text(n, source).to_string())
                        .unwrap_or_default();
                    let ty = child
                        .child_by_field_name("type")
                        .map(|n| Self::node_text(n, source).to_string());
                    let expr = match ty {
                        Some(t) if !t.is_empty() => format!("{t} = {value}"),
                        _ => value,
                    };
                    params.push(name);
                    exprs.push(expr);
                }
                "list_splat_pattern" | "dictionary_splat_pattern" => {
                    let name = Self::child_by_kind(child, "identifier")
                        .map(|n| Self::node_text(n, source).to_string())
                        .unwrap_or_default();
                    if !name.is_empty() {
                        params.push(name);
                        exprs.push(String::new());
                    }
                }
                _ => {}
            }
        }
        (params, exprs)
    }

    fn extract_decorators(func_node: Node, source: &[u8]) -> Vec<String> {
        let Some(parent) = func_node.parent() else { return Vec::new() };
        if parent.kind() != "decorated_definition" {
            return Vec::new();
        }
        let mut decorators = Vec::new();
        let mut cursor = parent.walk();
        for child in parent.children(&mut cursor) {
            if child.kind() == "decorator" {
                let text = Self::node_text(child, source).trim_start_matches('@').trim();
                decorators.push(text.to_string());
            }
        }
        decorators
    }
}

// =============================================================================
// Fact extraction
// =============================================================================

impl Python {
    /// Build a [`Statement`] from a statement node, extracting reads,
    /// writes, call sites, with-items, and the string-formatting flag.
    fn make_statement(node: Node, source: &[u8], id: StmtId) -> Statement {
        let mut reads = Vec::new();
        let mut writes = Vec::new();
        let mut calls = Vec::new();
        let mut with_items = Vec::new();

        let kind = match node.kind() {
            "expression_statement" => {
                let mut kind = StmtKind::Expr;
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    match child.kind() {
                        "assignment" => {
                            kind = StmtKind::Assign;
                            Self::extract_assignment(child, source, &mut reads, &mut writes, false);
                        }
                        "augmented_assignment" => {
                            kind = StmtKind::Assign;
                            Self::extract_assignment(child, source, &mut reads, &mut writes, true);
                        }
                        _ => Self::collect_atoms(child, source, &mut reads),
                    }
                }
                kind
            }
            "return_statement" => {
                Self::collect_atoms(node, source, &mut reads);
                StmtKind::Return
            }
            "raise_statement" => {
                Self::collect_atoms(node, source, &mut reads);
                StmtKind::Raise
            }
            "if_statement" | "elif_clause" => {
                if let Some(cond) = node.child_by_field_name("condition") {
                    Self::collect_atoms(cond, source, &mut reads);
                }
                StmtKind::If
            }
            "while_statement" => {
                if let Some(cond) = node.child_by_field_name("condition") {
                    Self::collect_atoms(cond, source, &mut reads);
                }
                StmtKind::Loop
            }
            "for_statement" => {
                if let Some(left) = node.child_by_field_name("left") {
                    Self::collect_target_names(left, source, &mut writes);
                }
                if let Some(right) = node.child_by_field_name("right") {
                    Self::collect_atoms(right, source, &mut reads);
                }
                StmtKind::Loop
            }
            "with_statement" => {
                Self::extract_with_items(node, source, &mut with_items, &mut reads, &mut writes);
                StmtKind::With
            }
            "except_clause" => StmtKind::Handler,
            "global_statement" | "nonlocal_statement" => {
                Self::collect_atoms(node, source, &mut reads);
                StmtKind::Global
            }
            "pass_statement" => StmtKind::Pass,
            _ => {
                Self::collect_atoms(node, source, &mut reads);
                StmtKind::Other
            }
        };

        // Call sites and the formatting flag come from the whole subtree,
        // excluding nested function/class bodies.
        Self::collect_calls(node, source, &mut calls, node.start_position().row);
        let formats_string = Self::detect_string_format(node, source);

        reads.sort_unstable();
        reads.dedup();
        writes.sort_unstable();
        writes.dedup();

        Statement {
            id,
            line_start: node.start_position().row + 1,
            line_end: node.end_position().row + 1,
            kind,
            reads,
            writes,
            calls,
            with_items,
            formats_string,
            text: Self::snippet(node, source),
        }
    }

    fn extract_assignment(
        node: Node,
        source: &[u8],
        reads: &mut Vec<String>,
        writes: &mut Vec<String>,
        augmented: bool,
    ) {
        if let Some(left) = node.child_by_field_name("left") {
            Self::collect_target_names(left, source, writes);
            if augmented {
                // x += y reads the old value of x.
                Self::collect_atoms(left, source, reads);
            } else if matches!(left.kind(), "subscript" | "attribute") {
                // d[k] = v and o.f = v mutate the base object; record the
                // base as a read so container taint is preserved.
                Self::collect_atoms(left, source, reads);
            }
        }
        if let Some(right) = node.child_by_field_name("right") {
            Self::collect_atoms(right, source, reads);
        }
    }

    /// Collect assignment-target names. Subscript/attribute targets
    /// record the base identifier (mutating `d[k]` writes `d`).
    fn collect_target_names(node: Node, source: &[u8], writes: &mut Vec<String>) {
        match node.kind() {
            "identifier" => writes.push(Self::node_text(node, source).to_string()),
            "subscript" | "attribute" => {
                if let Some(base) = Self::base_identifier(node, source) {
                    writes.push(base);
                }
            }
            "pattern_list" | "tuple_pattern" | "list_pattern" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    Self::collect_target_names(child, source, writes);
                }
            }
            _ => {}
        }
    }

    /// Leftmost identifier of a subscript/attribute chain.
    fn base_identifier(node: Node, source: &[u8]) -> Option<String> {
        let mut current = node;
        loop {
            match current.kind() {
                "identifier" => return Some(Self::node_text(current, source).to_string()),
                "attribute" | "subscript" => {
                    current = current.child_by_field_name("object")
                        .or_else(|| current.child_by_field_name("value"))?;
                }
                _ => return None,
            }
        }
    }

    /// Recursively collect read atoms: identifiers and simple dotted
    /// attribute paths. Descends into f-string interpolations so
    /// `f"... {user_id}"` records `user_id` as a read.
    fn collect_atoms(node: Node, source: &[u8], atoms: &mut Vec<String>) {
        match node.kind() {
            "identifier" => atoms.push(Self::node_text(node, source).to_string()),
            "attribute" => {
                let text = Self::node_text(node, source);
                if !text.contains('(') && !text.contains('[') && !text.contains('\n') {
                    atoms.push(text.to_string());
                }
                if let Some(base) = Self::base_identifier(node, source) {
                    atoms.push(base);
                }
                // Also descend so call results in the object position
                // (`resp.json().user`) contribute their own atoms.
                if let Some(object) = node.child_by_field_name("object") {
                    if matches!(object.kind(), "call" | "subscript") {
                        Self::collect_atoms(object, source, atoms);
                    }
                }
            }
            "function_definition" | "class_definition" | "lambda" => {}
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    Self::collect_atoms(child, source, atoms);
                }
            }
        }
    }

    /// Collect call sites in the subtree, excluding nested definitions.
    fn collect_calls(node: Node, source: &[u8], calls: &mut Vec<CallSite>, _base_row: usize) {
        if matches!(node.kind(), "function_definition" | "class_definition" | "lambda") {
            return;
        }
        if node.kind() == "call" {
            if let Some(function) = node.child_by_field_name("function") {
                let callee = Self::node_text(function, source)
                    .split_whitespace()
                    .collect::<String>();
                let mut args = Vec::new();
                if let Some(arglist) = node.child_by_field_name("arguments") {
                    let mut cursor = arglist.walk();
                    for arg in arglist.children(&mut cursor) {
                        if matches!(arg.kind(), "(" | ")" | ",") {
                            continue;
                        }
                        let mut atoms = Vec::new();
                        Self::collect_atoms(arg, source, &mut atoms);
                        atoms.sort_unstable();
                        atoms.dedup();
                        args.push(CallArg {
                            text: Self::node_text(arg, source).trim().to_string(),
                            atoms,
                        });
                    }
                }
                calls.push(CallSite {
                    callee,
                    args,
                    line: node.start_position().row + 1,
                });
            }
        }
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            Self::collect_calls(child, source, calls, _base_row);
        }
    }

    fn extract_with_items(
        node: Node,
        source: &[u8],
        items: &mut Vec<WithItem>,
        reads: &mut Vec<String>,
        writes: &mut Vec<String>,
    ) {
        let Some(clause) = Self::child_by_kind(node, "with_clause") else { return };
        let mut cursor = clause.walk();
        for item in clause.children(&mut cursor) {
            if item.kind() != "with_item" {
                continue;
            }
            let Some(value) = item.child_by_field_name("value") else { continue };
            if value.kind() == "as_pattern" {
                let context = value
                    .child(0)
                    .map(|n| Self::node_text(n, source).to_string())
                    .unwrap_or_default();
                let as_name = value
                    .child_by_field_name("alias")
                    .map(|n| Self::node_text(n, source).to_string());
                if let Some(ref name) = as_name {
                    writes.push(name.clone());
                }
                if let Some(ctx_node) = value.child(0) {
                    Self::collect_atoms(ctx_node, source, reads);
                }
                items.push(WithItem { context, as_name });
            } else {
                Self::collect_atoms(value, source, reads);
                items.push(WithItem {
                    context: Self::node_text(value, source).to_string(),
                    as_name: None,
                });
            }
        }
    }

    /// True when the statement builds a string via f-string
    /// interpolation, `%` formatting, `.format(...)`, or concatenation
    /// with a string literal.
    fn detect_string_format(node: Node, source: &[u8]) -> bool {
        match node.kind() {
            "string" => {
                let mut cursor = node.walk();
                return node.children(&mut cursor).any(|c| c.kind() == "interpolation");
            }
            "binary_operator" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| Self::node_text(o, source))
                    .unwrap_or("");
                if op == "%" || op == "+" {
                    let left_is_str = node
                        .child_by_field_name("left")
                        .map(|n| n.kind() == "string" || Self::detect_string_format(n, source))
                        .unwrap_or(false);
                    let right_is_str = node
                        .child_by_field_name("right")
                        .map(|n| n.kind() == "string")
                        .unwrap_or(false);
                    if left_is_str || right_is_str {
                        return true;
                    }
                }
            }
            "call" => {
                if let Some(function) = node.child_by_field_name("function") {
                    if Self::node_text(function, source).ends_with(".format") {
                        return true;
                    }
                }
            }
            "function_definition" | "class_definition" | "lambda" => return false,
            _ => {}
        }
        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .any(|c| Self::detect_string_format(c, source));
        found
    }
}

// =============================================================================
// CFG construction
// =============================================================================

/// Lowers one function body into statements plus a CFG.
///
/// Statement ids are allocated in source order. Edges carry the semantic
/// kind (`Seq`, branch pair, loop back-edge, exception, return); dangling
/// outs of the final block plus all returns and unhandled raises connect
/// to the synthetic exit node.
struct PyLowerer<'a> {
    source: &'a [u8],
    statements: Vec<Statement>,
    edges: Vec<CfgEdge>,
    /// Return statements needing an edge to the exit node
    returns: Vec<StmtId>,
    /// Statements whose exception propagates out of the function
    raises_out: Vec<StmtId>,
    /// Per-loop break collection (innermost last)
    break_stack: Vec<Vec<StmtId>>,
    /// Loop header stack for continue edges
    loop_headers: Vec<StmtId>,
    /// Names declared `global`
    global_names: Vec<String>,
}

impl<'a> PyLowerer<'a> {
    fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            statements: Vec::new(),
            edges: Vec::new(),
            returns: Vec::new(),
            raises_out: Vec::new(),
            break_stack: Vec::new(),
            loop_headers: Vec::new(),
            global_names: Vec::new(),
        }
    }

    fn new_statement(&mut self, node: Node) -> StmtId {
        let id = StmtId(self.statements.len());
        let stmt = Python::make_statement(node, self.source, id);
        if stmt.kind == StmtKind::Global {
            for read in &stmt.reads {
                if !self.global_names.contains(read) {
                    self.global_names.push(read.clone());
                }
            }
        }
        self.statements.push(stmt);
        id
    }

    fn connect(&mut self, preds: &[(StmtId, EdgeKind)], to: StmtId) {
        for &(from, kind) in preds {
            self.edges.push(CfgEdge { from, to, kind });
        }
    }

    /// Process a suite of statements. `preds` are the dangling edges
    /// entering the suite; the return value is the dangling edges leaving
    /// it (empty when every path terminates).
    fn process_block(
        &mut self,
        block: Node,
        mut preds: Vec<(StmtId, EdgeKind)>,
    ) -> Vec<(StmtId, EdgeKind)> {
        let mut cursor = block.walk();
        let children: Vec<Node> = block.children(&mut cursor).collect();
        for child in children {
            if child.kind() == "comment" {
                continue;
            }
            preds = self.process_statement(child, preds);
        }
        preds
    }

    fn process_statement(
        &mut self,
        node: Node,
        preds: Vec<(StmtId, EdgeKind)>,
    ) -> Vec<(StmtId, EdgeKind)> {
        match node.kind() {
            "if_statement" => self.process_if(node, preds),
            "while_statement" | "for_statement" => self.process_loop(node, preds),
            "try_statement" => self.process_try(node, preds),
            "with_statement" => {
                let id = self.new_statement(node);
                self.connect(&preds, id);
                if let Some(body) = node.child_by_field_name("body") {
                    self.process_block(body, vec![(id, EdgeKind::Seq)])
                } else {
                    vec![(id, EdgeKind::Seq)]
                }
            }
            "return_statement" => {
                let id = self.new_statement(node);
                self.connect(&preds, id);
                self.returns.push(id);
                vec![]
            }
            "raise_statement" => {
                let id = self.new_statement(node);
                self.connect(&preds, id);
                self.raises_out.push(id);
                vec![]
            }
            "break_statement" => {
                let id = self.new_statement(node);
                self.connect(&preds, id);
                if let Some(breaks) = self.break_stack.last_mut() {
                    breaks.push(id);
                }
                vec![]
            }
            "continue_statement" => {
                let id = self.new_statement(node);
                self.connect(&preds, id);
                if let Some(&header) = self.loop_headers.last() {
                    self.edges.push(CfgEdge {
                        from: id,
                        to: header,
                        kind: EdgeKind::LoopBack,
                    });
                }
                vec![]
            }
            "function_definition" | "class_definition" | "decorated_definition" => {
                // Nested definitions are a single opaque statement here.
                let id = self.new_statement(node);
                self.connect(&preds, id);
                vec![(id, EdgeKind::Seq)]
            }
            _ => {
                let id = self.new_statement(node);
                self.connect(&preds, id);
                vec![(id, EdgeKind::Seq)]
            }
        }
    }

    fn process_if(&mut self, node: Node, preds: Vec<(StmtId, EdgeKind)>) -> Vec<(StmtId, EdgeKind)> {
        let cond = self.new_statement(node);
        self.connect(&preds, cond);

        let mut outs = Vec::new();
        if let Some(consequence) = node.child_by_field_name("consequence") {
            let branch_outs = self.process_block(consequence, vec![(cond, EdgeKind::BranchTrue)]);
            outs.extend(branch_outs);
        }

        // Chain elif clauses as nested conditions off the false edge;
        // a final else consumes it.
        let mut false_edge: Option<(StmtId, EdgeKind)> = Some((cond, EdgeKind::BranchFalse));
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "elif_clause" => {
                    let elif_cond = self.new_statement(child);
                    if let Some(edge) = false_edge.take() {
                        self.connect(&[edge], elif_cond);
                    }
                    if let Some(consequence) = child.child_by_field_name("consequence") {
                        let branch_outs =
                            self.process_block(consequence, vec![(elif_cond, EdgeKind::BranchTrue)]);
                        outs.extend(branch_outs);
                    }
                    false_edge = Some((elif_cond, EdgeKind::BranchFalse));
                }
                "else_clause" => {
                    if let Some(body) = child.child_by_field_name("body") {
                        let entry_edge = false_edge.take().into_iter().collect();
                        let branch_outs = self.process_block(body, entry_edge);
                        outs.extend(branch_outs);
                    }
                }
                _ => {}
            }
        }

        if let Some(edge) = false_edge {
            outs.push(edge);
        }
        outs
    }

    fn process_loop(&mut self, node: Node, preds: Vec<(StmtId, EdgeKind)>) -> Vec<(StmtId, EdgeKind)> {
        let header = self.new_statement(node);
        self.connect(&preds, header);

        self.loop_headers.push(header);
        self.break_stack.push(Vec::new());

        if let Some(body) = node.child_by_field_name("body") {
            let body_outs = self.process_block(body, vec![(header, EdgeKind::BranchTrue)]);
            for (from, _) in body_outs {
                self.edges.push(CfgEdge {
                    from,
                    to: header,
                    kind: EdgeKind::LoopBack,
                });
            }
        }

        self.loop_headers.pop();
        let breaks = self.break_stack.pop().unwrap_or_default();

        let mut outs = vec![(header, EdgeKind::LoopExit)];
        outs.extend(breaks.into_iter().map(|id| (id, EdgeKind::LoopExit)));
        outs
    }

    fn process_try(&mut self, node: Node, preds: Vec<(StmtId, EdgeKind)>) -> Vec<(StmtId, EdgeKind)> {
        let body_first = self.statements.len();
        let body_outs = node
            .child_by_field_name("body")
            .map(|body| self.process_block(body, preds.clone()))
            .unwrap_or(preds);
        let body_last = self.statements.len();

        // Raise statements inside the body target the handlers, not the
        // function exit; the blanket body->handler edges below cover them.
        self.raises_out
            .retain(|id| !(id.0 >= body_first && id.0 < body_last));

        let mut handler_outs = Vec::new();
        let mut has_handlers = false;
        let mut else_outs = Vec::new();
        let mut finally: Option<Node> = None;

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "except_clause" | "except_group_clause" => {
                    has_handlers = true;
                    let handler = self.new_statement(child);
                    // Every statement in the try suite may raise into
                    // this handler.
                    for idx in body_first..body_last {
                        self.edges.push(CfgEdge {
                            from: StmtId(idx),
                            to: handler,
                            kind: EdgeKind::Exception,
                        });
                    }
                    // Handler body is its last named block child.
                    let mut hcursor = child.walk();
                    let hbody = child
                        .children(&mut hcursor)
                        .filter(|c| c.kind() == "block")
                        .last();
                    if let Some(hbody) = hbody {
                        let outs = self.process_block(hbody, vec![(handler, EdgeKind::Seq)]);
                        handler_outs.extend(outs);
                    } else {
                        handler_outs.push((handler, EdgeKind::Seq));
                    }
                }
                "else_clause" => {
                    if let Some(body) = child.child_by_field_name("body") {
                        else_outs = self.process_block(body, body_outs.clone());
                    }
                }
                "finally_clause" => finally = Some(child),
                _ => {}
            }
        }

        if !has_handlers {
            // No handler: body exceptions propagate out of the function.
            for idx in body_first..body_last {
                self.raises_out.push(StmtId(idx));
            }
        }

        let mut outs = if else_outs.is_empty() { body_outs } else { else_outs };
        outs.extend(handler_outs);

        if let Some(finally_node) = finally {
            let fbody = {
                let mut fcursor = finally_node.walk();
                let found = finally_node
                    .children(&mut fcursor)
                    .find(|c| c.kind() == "block");
                found
            };
            if let Some(fbody) = fbody {
                outs = self.process_block(fbody, outs);
            }
        }

        outs
    }

    /// Connect all remaining dangling edges to the synthetic exit node.
    fn finish(&mut self, dangling: Vec<(StmtId, EdgeKind)>) {
        let exit = StmtId(self.statements.len());
        for (from, kind) in dangling {
            self.edges.push(CfgEdge { from, to: exit, kind });
        }
        for id in std::mem::take(&mut self.returns) {
            self.edges.push(CfgEdge {
                from: id,
                to: exit,
                kind: EdgeKind::Return,
            });
        }
        for id in std::mem::take(&mut self.raises_out) {
            self.edges.push(CfgEdge {
                from: id,
                to: exit,
                kind: EdgeKind::Exception,
            });
        }
    }

    fn into_parts(self) -> (Vec<Statement>, Cfg) {
        let exit = StmtId(self.statements.len());
        let entry = if self.statements.is_empty() {
            None
        } else {
            Some(StmtId(0))
        };
        (
            self.statements,
            Cfg {
                entry,
                edges: self.edges,
                exit,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::traits::Language;

    fn lower(source: &str) -> SourceUnit {
        let lang = Python;
        let mut parser = lang.parser().unwrap();
        let tree = parser.parse(source, None).unwrap();
        lang.lower(&tree, source.as_bytes(), "test.py").unwrap()
    }

    #[test]
    fn test_lower_simple_function() {
        let unit = lower("def add(a, b):\n    total = a + b\n    return total\n");
        assert_eq!(unit.functions.len(), 1);
        let func = &unit.functions[0];
        assert_eq!(func.name, "add");
        assert_eq!(func.params, vec!["a", "b"]);
        assert_eq!(func.statements.len(), 2);
        assert_eq!(func.statements[0].kind, StmtKind::Assign);
        assert!(func.statements[0].writes_name("total"));
        assert!(func.statements[0].reads_name("a"));
        assert_eq!(func.statements[1].kind, StmtKind::Return);
    }

    #[test]
    fn test_method_qualified_name() {
        let unit = lower("class Store:\n    def get(self, key):\n        return self.data[key]\n");
        assert_eq!(unit.classes.len(), 1);
        assert_eq!(unit.functions[0].qualified_name, "Store.get");
    }

    #[test]
    fn test_fstring_interpolation_is_a_read_and_format() {
        let unit = lower(
            "def build(user_id):\n    sql = f\"SELECT * FROM users WHERE id = {user_id}\"\n    return sql\n",
        );
        let stmt = &unit.functions[0].statements[0];
        assert!(stmt.reads_name("user_id"), "reads: {:?}", stmt.reads);
        assert!(stmt.formats_string);
        assert!(stmt.writes_name("sql"));
    }

    #[test]
    fn test_call_site_extraction() {
        let unit = lower("def run(q):\n    cursor.execute(q, timeout)\n");
        let stmt = &unit.functions[0].statements[0];
        assert_eq!(stmt.calls.len(), 1);
        let call = &stmt.calls[0];
        assert_eq!(call.callee, "cursor.execute");
        assert_eq!(call.args.len(), 2);
        assert!(call.args[0].atoms.contains(&"q".to_string()));
    }

    #[test]
    fn test_branch_cfg_edges() {
        let unit = lower(
            "def f(flag):\n    if flag:\n        a = 1\n    else:\n        a = 2\n    return a\n",
        );
        let func = &unit.functions[0];
        let cond = func.statements.iter().find(|s| s.kind == StmtKind::If).unwrap();
        let succ: Vec<EdgeKind> = func.cfg.successors(cond.id).map(|(_, k)| k).collect();
        assert!(succ.contains(&EdgeKind::BranchTrue));
        assert!(succ.contains(&EdgeKind::BranchFalse));
    }

    #[test]
    fn test_early_return_reaches_exit() {
        let unit = lower(
            "def f(cond, path):\n    h = open(path)\n    if cond:\n        return 1\n    h.close()\n    return 2\n",
        );
        let func = &unit.functions[0];
        let returns: Vec<&Statement> = func
            .statements
            .iter()
            .filter(|s| s.kind == StmtKind::Return)
            .collect();
        assert_eq!(returns.len(), 2);
        for ret in returns {
            assert!(func
                .cfg
                .successors(ret.id)
                .any(|(to, kind)| to == func.cfg.exit && kind == EdgeKind::Return));
        }
    }

    #[test]
    fn test_try_except_exception_edges() {
        let unit = lower(
            "def f(p):\n    try:\n        g = open(p)\n        g.write('x')\n    except OSError:\n        pass\n    return 1\n",
        );
        let func = &unit.functions[0];
        let handler = func
            .statements
            .iter()
            .find(|s| s.kind == StmtKind::Handler)
            .expect("handler statement");
        // Both try-body statements must have exception edges into the handler.
        let incoming: Vec<StmtId> = func
            .cfg
            .predecessors(handler.id)
            .filter(|(_, kind)| *kind == EdgeKind::Exception)
            .map(|(from, _)| from)
            .collect();
        assert!(incoming.len() >= 2, "exception edges: {incoming:?}");
    }

    #[test]
    fn test_with_statement_items() {
        let unit = lower("def f(p):\n    with open(p) as fh:\n        return fh.read()\n");
        let stmt = &unit.functions[0].statements[0];
        assert_eq!(stmt.kind, StmtKind::With);
        assert_eq!(stmt.with_items.len(), 1);
        assert_eq!(stmt.with_items[0].as_name.as_deref(), Some("fh"));
        assert!(stmt.with_items[0].context.starts_with("open"));
    }

    #[test]
    fn test_module_bindings_and_imports() {
        let unit = lower(
            "import threading\nfrom api import utils\n\nlock_a = threading.Lock()\nbalance = {'value': 0}\n",
        );
        assert_eq!(unit.imports.len(), 2);
        assert_eq!(unit.imports[0].module, "threading");
        assert_eq!(unit.imports[1].module, "api");
        assert_eq!(unit.imports[1].names[0].name, "utils");
        assert_eq!(unit.bindings.len(), 2);
        assert_eq!(unit.bindings[0].name, "lock_a");
        assert_eq!(unit.bindings[0].init, "threading.Lock()");
    }

    #[test]
    fn test_global_declaration_recorded() {
        let unit = lower("counter = 0\n\ndef bump():\n    global counter\n    counter = counter + 1\n");
        let func = &unit.functions[0];
        assert_eq!(func.global_names, vec!["counter"]);
    }

    #[test]
    fn test_loop_back_edge() {
        let unit = lower("def f(items):\n    for item in items:\n        use(item)\n    return 0\n");
        let func = &unit.functions[0];
        let header = func.statements.iter().find(|s| s.kind == StmtKind::Loop).unwrap();
        assert!(func
            .cfg
            .edges
            .iter()
            .any(|e| e.to == header.id && e.kind == EdgeKind::LoopBack));
    }

    #[test]
    fn test_decorators_extracted() {
        let unit = lower("@app.get('/users')\ndef list_users():\n    return []\n");
        assert_eq!(unit.functions[0].decorators, vec!["app.get('/users')"]);
    }
}
