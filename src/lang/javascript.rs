//! JavaScript/TypeScript language support.
//!
//! Implements the [`Language`] trait via the tree-sitter-typescript
//! grammar (a superset of JavaScript, so plain `.js` files parse too).
//! Lowering is lower-fidelity than Python's: functions, imports,
//! assignments, calls, branches, loops, and try/catch are modeled; JSX
//! and class field minutiae are not.

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, QueryCursor, Tree};

use crate::error::{HoundError, Result};
use crate::lang::traits::Language;
use crate::model::types::{
    CallArg, CallSite, Cfg, CfgEdge, ClassDecl, EdgeKind, FunctionModel, ImportDecl, ImportedName,
    ModuleBinding, SourceUnit, Statement, StmtId, StmtKind,
};

const MAX_SNIPPET_LEN: usize = 160;

/// JavaScript/TypeScript language implementation.
pub struct JavaScript;

impl Language for JavaScript {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &[&'static str] {
        &[".js", ".mjs", ".cjs", ".ts"]
    }

    fn parser(&self) -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|e| HoundError::TreeSitter(e.to_string()))?;
        Ok(parser)
    }

    fn lower(&self, tree: &Tree, source: &[u8], path: &str) -> Result<SourceUnit> {
        let root = tree.root_node();

        let mut unit = SourceUnit {
            path: path.to_string(),
            language: "javascript".to_string(),
            imports: Vec::new(),
            bindings: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            module_statements: Vec::new(),
        };

        let mut cursor = root.walk();
        for child in root.children(&mut cursor) {
            Self::lower_module_item(child, source, &mut unit);
        }

        let query_str = r#"[
            (function_declaration name: (identifier) @name) @function
            (method_definition name: (property_identifier) @name) @function
        ]"#;
        let ts_lang = tree.language();
        let query = super::get_cached_query(&ts_lang, "javascript", "function", query_str)?;

        let mut qcursor = QueryCursor::new();
        let mut matches = qcursor.matches(&query, root, source);
        while let Some(m) = matches.next() {
            let func_node = m
                .captures
                .iter()
                .find(|c| query.capture_names()[c.index as usize] == "function")
                .map(|c| c.node);
            let Some(func_node) = func_node else { continue };

            if let Some(class_name) = Self::enclosing_context(func_node, source) {
                let function = Self::lower_function(func_node, source, class_name.as_deref());
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
            if trimmed.starts_with("function ") || trimmed.contains("=> {") {
                score += 4;
            }
            if trimmed.starts_with("const ")
                || trimmed.starts_with("let ")
                || trimmed.starts_with("var ")
            {
                score += 2;
            }
            if trimmed.starts_with("//") {
                score += 1;
            }
            if trimmed.contains("===") || trimmed.contains("!==") {
                score += 2;
            }
            if trimmed.ends_with(';') || trimmed.ends_with('{') {
                score += 1;
            }
            // Python-only shapes count against JavaScript.
            if trimmed.starts_with("def ") || trimmed.starts_with("elif ") {
                score = score.saturating_sub(3);
            }
        }
        score
    }
}

// =============================================================================
// Helpers
// =============================================================================

impl JavaScript {
    fn node_text<'a>(node: Node<'a>, source: &'a [u8]) -> &'a str {
        std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
    }

    fn snippet(node: Node, source: &[u8]) -> String {
        let text = Self::node_text(node, source);
        let first = text.lines().next().unwrap_or("").trim();
        if first.len() > MAX_SNIPPET_LEN {
            first.chars().take(MAX_SNIPPET_LEN).collect()
        } else {
            first.to_string()
        }
    }

    fn enclosing_context(node: Node, source: &[u8]) -> Option<Option<String>> {
        let mut class_name = None;
        let mut current = node.parent();
        while let Some(parent) = current {
            match parent.kind() {
                "function_declaration" | "method_definition" | "arrow_function"
                | "function_expression" => return None,
                "class_declaration" => {
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

    fn lower_module_item(node: Node, source: &[u8], unit: &mut SourceUnit) {
        match node.kind() {
            "import_statement" => Self::extract_import(node, source, unit),
            "class_declaration" => {
                if let Some(name) = node.child_by_field_name("name") {
                    unit.classes.push(ClassDecl {
                        name: Self::node_text(name, source).to_string(),
                        line: node.start_position().row + 1,
                    });
                }
            }
            "function_declaration" => {} // handled by the function query
            "lexical_declaration" | "variable_declaration" => {
                Self::extract_module_binding(node, source, unit);
                let id = StmtId(unit.module_statements.len());
                unit.module_statements.push(Self::make_statement(node, source, id));
            }
            "expression_statement" | "if_statement" | "for_statement" | "while_statement"
            | "try_statement" => {
                let id = StmtId(unit.module_statements.len());
                unit.module_statements.push(Self::make_statement(node, source, id));
            }
            _ => {}
        }
    }

    fn extract_module_binding(node: Node, source: &[u8], unit: &mut SourceUnit) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "variable_declarator" {
                continue;
            }
            let Some(name) = child.child_by_field_name("name") else { continue };
            if name.kind() != "identifier" {
                continue;
            }
            let init = child
                .child_by_field_name("value")
                .map(|v| Self::node_text(v, source).trim().to_string())
                .unwrap_or_default();

            // `const x = require("mod")` is an import in CommonJS shape.
            if init.starts_with("require(") {
                let module = init
                    .trim_start_matches("require(")
                    .trim_end_matches(')')
                    .trim_matches(|c| c == '"' || c == '\'')
                    .to_string();
                unit.imports.push(ImportDecl {
                    module,
                    alias: Some(Self::node_text(name, source).to_string()),
                    names: Vec::new(),
                    line: node.start_position().row + 1,
                });
                continue;
            }

            unit.bindings.push(ModuleBinding {
                name: Self::node_text(name, source).to_string(),
                init,
                line: node.start_position().row + 1,
            });
        }
    }

    /// `import x from "mod"` / `import { a, b as c } from "mod"`
    fn extract_import(node: Node, source: &[u8], unit: &mut SourceUnit) {
        let line = node.start_position().row + 1;
        let module = node
            .child_by_field_name("source")
            .map(|s| Self::node_text(s, source).trim_matches(|c| c == '"' || c == '\'').to_string())
            .unwrap_or_default();

        let mut names = Vec::new();
        let mut alias = None;

        fn walk_clause(node: Node, source: &[u8], names: &mut Vec<ImportedName>, alias: &mut Option<String>) {
            match node.kind() {
                "import_specifier" => {
                    let name = node
                        .child_by_field_name("name")
                        .map(|n| JavaScript::node_text(n, source).to_string())
                        .unwrap_or_default();
                    let spec_alias = node
                        .child_by_field_name("alias")
                        .map(|n| JavaScript::node_text(n, source).to_string());
                    names.push(ImportedName { name, alias: spec_alias });
                }
                "identifier" => {
                    // Default import binding.
                    if alias.is_none() {
                        *alias = Some(JavaScript::node_text(node, source).to_string());
                    }
                }
                _ => {
                    let mut cursor = node.walk();
                    for child in node.children(&mut cursor) {
                        walk_clause(child, source, names, alias);
                    }
                }
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "import_clause" {
                walk_clause(child, source, &mut names, &mut alias);
            }
        }

        unit.imports.push(ImportDecl {
            module,
            alias,
            names,
            line,
        });
    }

    fn lower_function(node: Node, source: &[u8], class_name: Option<&str>) -> FunctionModel {
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(n, source).to_string())
            .unwrap_or_else(|| "<anonymous>".to_string());
        let qualified_name = match class_name {
            Some(class) => format!("{class}.{name}"),
            None => name.clone(),
        };

        let mut params = Vec::new();
        if let Some(params_node) = node.child_by_field_name("parameters") {
            let mut cursor = params_node.walk();
            for child in params_node.children(&mut cursor) {
                match child.kind() {
                    "identifier" => params.push(Self::node_text(child, source).to_string()),
                    "required_parameter" | "optional_parameter" => {
                        if let Some(pattern) = child.child_by_field_name("pattern") {
                            if pattern.kind() == "identifier" {
                                params.push(Self::node_text(pattern, source).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        let param_exprs = vec![String::new(); params.len()];

        let is_async = Self::node_text(node, source).starts_with("async ");

        let mut lowerer = JsLowerer::new(source);
        if let Some(body) = node.child_by_field_name("body") {
            let dangling = lowerer.process_block(body, vec![]);
            lowerer.finish(dangling);
        }
        let (statements, cfg) = lowerer.into_parts();

        FunctionModel {
            name,
            qualified_name,
            params,
            param_exprs,
            decorators: Vec::new(),
            is_async,
            line_start: node.start_position().row + 1,
            line_end: node.end_position().row + 1,
            statements,
            cfg,
            global_names: Vec::new(),
        }
    }

    fn make_statement(node: Node, source: &[u8], id: StmtId) -> Statement {
        let mut reads = Vec::new();
        let mut writes = Vec::new();
        let mut calls = Vec::new();

        let kind = match node.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() != "variable_declarator" {
                        continue;
                    }
                    if let Some(name) = child.child_by_field_name("name") {
                        if name.kind() == "identifier" {
                            writes.push(Self::node_text(name, source).to_string());
                        }
                    }
                    if let Some(value) = child.child_by_field_name("value") {
                        Self::collect_atoms(value, source, &mut reads);
                    }
                }
                StmtKind::Assign
            }
            "expression_statement" => {
                let mut kind = StmtKind::Expr;
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    match child.kind() {
                        "assignment_expression" | "augmented_assignment_expression" => {
                            kind = StmtKind::Assign;
                            if let Some(left) = child.child_by_field_name("left") {
                                if let Some(base) = Self::base_identifier(left, source) {
                                    writes.push(base);
                                }
                                if child.kind() == "augmented_assignment_expression"
                                    || matches!(left.kind(), "member_expression" | "subscript_expression")
                                {
                                    Self::collect_atoms(left, source, &mut reads);
                                }
                            }
                            if let Some(right) = child.child_by_field_name("right") {
                                Self::collect_atoms(right, source, &mut reads);
                            }
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
            "throw_statement" => {
                Self::collect_atoms(node, source, &mut reads);
                StmtKind::Raise
            }
            "if_statement" | "while_statement" => {
                if let Some(cond) = node.child_by_field_name("condition") {
                    Self::collect_atoms(cond, source, &mut reads);
                }
                if node.kind() == "if_statement" {
                    StmtKind::If
                } else {
                    StmtKind::Loop
                }
            }
            "for_statement" | "for_in_statement" => {
                Self::collect_atoms(node, source, &mut reads);
                StmtKind::Loop
            }
            "catch_clause" => StmtKind::Handler,
            "empty_statement" => StmtKind::Pass,
            _ => {
                Self::collect_atoms(node, source, &mut reads);
                StmtKind::Other
            }
        };

        Self::collect_calls(node, source, &mut calls);
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
            with_items: Vec::new(),
            formats_string,
            text: Self::snippet(node, source),
        }
    }

    fn base_identifier(node: Node, source: &[u8]) -> Option<String> {
        let mut current = node;
        loop {
            match current.kind() {
                "identifier" => return Some(Self::node_text(current, source).to_string()),
                "member_expression" | "subscript_expression" => {
                    current = current.child_by_field_name("object")?;
                }
                _ => return None,
            }
        }
    }

    fn collect_atoms(node: Node, source: &[u8], atoms: &mut Vec<String>) {
        match node.kind() {
            "identifier" => atoms.push(Self::node_text(node, source).to_string()),
            "member_expression" => {
                let text = Self::node_text(node, source);
                if !text.contains('(') && !text.contains('[') && !text.contains('\n') {
                    atoms.push(text.to_string());
                }
                if let Some(base) = Self::base_identifier(node, source) {
                    atoms.push(base);
                }
            }
            "function_declaration" | "function_expression" | "arrow_function"
            | "class_declaration" => {}
            _ => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    Self::collect_atoms(child, source, atoms);
                }
            }
        }
    }

    fn collect_calls(node: Node, source: &[u8], calls: &mut Vec<CallSite>) {
        if matches!(
            node.kind(),
            "function_declaration" | "function_expression" | "arrow_function" | "class_declaration"
        ) {
            return;
        }
        if node.kind() == "call_expression" {
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
            Self::collect_calls(child, source, calls);
        }
    }

    fn detect_string_format(node: Node, source: &[u8]) -> bool {
        match node.kind() {
            "template_string" => {
                let mut cursor = node.walk();
                return node
                    .children(&mut cursor)
                    .any(|c| c.kind() == "template_substitution");
            }
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| Self::node_text(o, source))
                    .unwrap_or("");
                if op == "+" {
                    let string_operand = [node.child_by_field_name("left"), node.child_by_field_name("right")]
                        .into_iter()
                        .flatten()
                        .any(|n| n.kind() == "string" || n.kind() == "template_string");
                    if string_operand {
                        return true;
                    }
                }
            }
            "function_declaration" | "function_expression" | "arrow_function" => return false,
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

/// Statement/CFG lowerer for JavaScript function bodies. Mirrors the
/// Python lowerer with a smaller statement vocabulary.
struct JsLowerer<'a> {
    source: &'a [u8],
    statements: Vec<Statement>,
    edges: Vec<CfgEdge>,
    returns: Vec<StmtId>,
    raises_out: Vec<StmtId>,
    break_stack: Vec<Vec<StmtId>>,
    loop_headers: Vec<StmtId>,
}

impl<'a> JsLowerer<'a> {
    fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            statements: Vec::new(),
            edges: Vec::new(),
            returns: Vec::new(),
            raises_out: Vec::new(),
            break_stack: Vec::new(),
            loop_headers: Vec::new(),
        }
    }

    fn new_statement(&mut self, node: Node) -> StmtId {
        let id = StmtId(self.statements.len());
        self.statements
            .push(JavaScript::make_statement(node, self.source, id));
        id
    }

    fn connect(&mut self, preds: &[(StmtId, EdgeKind)], to: StmtId) {
        for &(from, kind) in preds {
            self.edges.push(CfgEdge { from, to, kind });
        }
    }

    fn process_block(
        &mut self,
        block: Node,
        mut preds: Vec<(StmtId, EdgeKind)>,
    ) -> Vec<(StmtId, EdgeKind)> {
        let mut cursor = block.walk();
        let children: Vec<Node> = block.children(&mut cursor).collect();
        for child in children {
            if matches!(child.kind(), "comment" | "{" | "}") {
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
            "while_statement" | "for_statement" | "for_in_statement" => {
                self.process_loop(node, preds)
            }
            "try_statement" => self.process_try(node, preds),
            "return_statement" => {
                let id = self.new_statement(node);
                self.connect(&preds, id);
                self.returns.push(id);
                vec![]
            }
            "throw_statement" => {
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
            "statement_block" => self.process_block(node, preds),
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
            outs.extend(self.process_statement(consequence, vec![(cond, EdgeKind::BranchTrue)]));
        }

        if let Some(alternative) = node.child_by_field_name("alternative") {
            // else_clause wraps either a block or a chained if.
            let mut cursor = alternative.walk();
            let inner = alternative
                .children(&mut cursor)
                .find(|c| c.kind() != "else");
            if let Some(inner) = inner {
                outs.extend(self.process_statement(inner, vec![(cond, EdgeKind::BranchFalse)]));
            } else {
                outs.push((cond, EdgeKind::BranchFalse));
            }
        } else {
            outs.push((cond, EdgeKind::BranchFalse));
        }
        outs
    }

    fn process_loop(&mut self, node: Node, preds: Vec<(StmtId, EdgeKind)>) -> Vec<(StmtId, EdgeKind)> {
        let header = self.new_statement(node);
        self.connect(&preds, header);

        self.loop_headers.push(header);
        self.break_stack.push(Vec::new());

        if let Some(body) = node.child_by_field_name("body") {
            let body_outs = self.process_statement(body, vec![(header, EdgeKind::BranchTrue)]);
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

        self.raises_out
            .retain(|id| !(id.0 >= body_first && id.0 < body_last));

        let mut outs = body_outs;

        if let Some(handler) = node.child_by_field_name("handler") {
            let handler_id = self.new_statement(handler);
            for idx in body_first..body_last {
                self.edges.push(CfgEdge {
                    from: StmtId(idx),
                    to: handler_id,
                    kind: EdgeKind::Exception,
                });
            }
            if let Some(hbody) = handler.child_by_field_name("body") {
                outs.extend(self.process_block(hbody, vec![(handler_id, EdgeKind::Seq)]));
            } else {
                outs.push((handler_id, EdgeKind::Seq));
            }
        } else {
            for idx in body_first..body_last {
                self.raises_out.push(StmtId(idx));
            }
        }

        if let Some(finalizer) = node.child_by_field_name("finalizer") {
            let mut cursor = finalizer.walk();
            let fbody = finalizer
                .children(&mut cursor)
                .find(|c| c.kind() == "statement_block");
            if let Some(fbody) = fbody {
                outs = self.process_block(fbody, outs);
            }
        }

        outs
    }

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
        let lang = JavaScript;
        let mut parser = lang.parser().unwrap();
        let tree = parser.parse(source, None).unwrap();
        lang.lower(&tree, source.as_bytes(), "test.js").unwrap()
    }

    #[test]
    fn test_lower_function_and_params() {
        let unit = lower("function greet(name) {\n  const msg = \"hi \" + name;\n  return msg;\n}\n");
        assert_eq!(unit.functions.len(), 1);
        let func = &unit.functions[0];
        assert_eq!(func.name, "greet");
        assert_eq!(func.params, vec!["name"]);
        assert_eq!(func.statements[0].kind, StmtKind::Assign);
        assert!(func.statements[0].writes_name("msg"));
        assert!(func.statements[0].formats_string);
    }

    #[test]
    fn test_template_string_reads_and_format() {
        let unit = lower("function q(id) {\n  const sql = `SELECT * FROM t WHERE id = ${id}`;\n  db.query(sql);\n}\n");
        let func = &unit.functions[0];
        assert!(func.statements[0].formats_string);
        assert!(func.statements[0].reads_name("id"));
        assert_eq!(func.statements[1].calls[0].callee, "db.query");
    }

    #[test]
    fn test_require_is_an_import() {
        let unit = lower("const express = require(\"express\");\nconst state = {count: 0};\n");
        assert_eq!(unit.imports.len(), 1);
        assert_eq!(unit.imports[0].module, "express");
        assert_eq!(unit.imports[0].alias.as_deref(), Some("express"));
        assert_eq!(unit.bindings.len(), 1);
        assert_eq!(unit.bindings[0].name, "state");
    }

    #[test]
    fn test_try_catch_exception_edges() {
        let unit = lower(
            "function f(p) {\n  try {\n    risky(p);\n  } catch (e) {\n    console.log(e);\n  }\n  return 1;\n}\n",
        );
        let func = &unit.functions[0];
        let handler = func
            .statements
            .iter()
            .find(|s| s.kind == StmtKind::Handler)
            .expect("handler");
        assert!(func
            .cfg
            .predecessors(handler.id)
            .any(|(_, kind)| kind == EdgeKind::Exception));
    }
}
