//! The light semantic pre-pass: scope population and error counting.
//!
//! This pass walks the AST once, declaring frames' and functions' bodies into
//! nested scopes, and reports undefined identifiers, duplicate declarations,
//! and assignments to constants. The walk itself never fails: the pipeline
//! aborts only when the error count is non-zero afterwards, and the compiler
//! still performs its own (weaker) resolution.
//!
//! Function declarations are hoisted within their enclosing block, so calls
//! may appear before the declaration they resolve to.

use crate::{
    ast::{AstNode, BinaryOp, NodeKind},
    error::Diagnostic,
    natives,
    symbol::{ScopeStack, SymbolKind},
};

/// The result of one semantic walk.
#[derive(Debug)]
pub struct SemanticReport {
    pub error_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Analyzes `root`, returning the diagnostics and their count.
#[must_use]
pub fn analyze(root: &AstNode) -> SemanticReport {
    let mut pass = SemanticPass {
        scopes: ScopeStack::new(),
        diagnostics: Vec::new(),
    };
    match &root.kind {
        NodeKind::Block(stmts) => pass.check_statements(stmts),
        _ => pass.check_node(root),
    }
    SemanticReport {
        error_count: pass.diagnostics.len(),
        diagnostics: pass.diagnostics,
    }
}

struct SemanticPass {
    scopes: ScopeStack,
    diagnostics: Vec<Diagnostic>,
}

impl SemanticPass {
    fn error(&mut self, node: &AstNode, message: String) {
        self.diagnostics.push(Diagnostic::new(node.loc.clone(), message));
    }

    /// Checks a statement list in the current scope, hoisting function
    /// declarations first.
    fn check_statements(&mut self, stmts: &[AstNode]) {
        for stmt in stmts {
            if let NodeKind::FuncDecl { name, .. } = &stmt.kind
                && !self.scopes.declare(name, SymbolKind::Func, -1)
            {
                self.error(stmt, format!("Duplicate declaration of '{name}'"));
            }
        }
        for stmt in stmts {
            self.check_node(stmt);
        }
    }

    fn check_scoped_statements(&mut self, stmts: &[AstNode]) {
        self.scopes.push_scope();
        self.check_statements(stmts);
        self.scopes.pop_scope();
    }

    fn check_node(&mut self, node: &AstNode) {
        match &node.kind {
            NodeKind::Block(stmts) => self.check_scoped_statements(stmts),
            NodeKind::Frame { body, .. } => self.check_scoped_statements(body),
            NodeKind::ClassDecl { name, members } => {
                if !self.scopes.declare(name, SymbolKind::Class, -1) {
                    self.error(node, format!("Duplicate declaration of '{name}'"));
                }
                self.check_scoped_statements(members);
            }
            NodeKind::VarDecl { name, is_const, init } => {
                if let Some(init) = init {
                    self.check_node(init);
                }
                let kind = if *is_const { SymbolKind::Const } else { SymbolKind::Var };
                if !self.scopes.declare(name, kind, -1) {
                    self.error(node, format!("Duplicate declaration of '{name}'"));
                }
            }
            NodeKind::FuncDecl { params, body, .. } => {
                // The name itself was hoisted by the enclosing block.
                self.scopes.push_scope();
                for param in params {
                    if !self.scopes.declare(param, SymbolKind::Var, -1) {
                        self.error(node, format!("Duplicate parameter '{param}'"));
                    }
                }
                self.check_node(body);
                self.scopes.pop_scope();
            }
            NodeKind::Import { .. } | NodeKind::Literal(_) | NodeKind::Docstring(_) | NodeKind::Regex(_) => {}
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_node(cond);
                self.check_node(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_node(else_branch);
                }
            }
            NodeKind::While { cond, body } => {
                self.check_node(cond);
                self.check_node(body);
            }
            NodeKind::For { init, cond, incr, body } => {
                self.check_node(init);
                self.check_node(cond);
                self.check_node(incr);
                self.check_node(body);
            }
            NodeKind::Switch { scrutinee, cases } => {
                self.check_node(scrutinee);
                self.check_node(cases);
            }
            NodeKind::TryCatch { try_body, catch_body } => {
                self.check_node(try_body);
                if let Some(catch_body) = catch_body {
                    self.check_node(catch_body);
                }
            }
            NodeKind::OnError { body } => self.check_node(body),
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    self.check_node(value);
                }
            }
            NodeKind::ExprStmt(expr) | NodeKind::Interpolation(expr) => self.check_node(expr),
            NodeKind::Identifier(name) => self.check_identifier_read(node, name),
            NodeKind::Binary { op, left, right } => {
                if op.is_assignment() {
                    self.check_assignment_target(op, left);
                } else {
                    self.check_node(left);
                }
                self.check_node(right);
            }
            NodeKind::Unary { operand, .. } => self.check_node(operand),
            NodeKind::Call { callee, args } => {
                if let NodeKind::Identifier(name) = &callee.kind {
                    if self.scopes.resolve(name).is_none() && !natives::is_native_name(name) {
                        self.error(callee, format!("Call to undefined function '{name}'"));
                    }
                } else {
                    self.check_node(callee);
                }
                for arg in args {
                    self.check_node(arg);
                }
            }
            NodeKind::Index { object, index } => {
                self.check_node(object);
                self.check_node(index);
            }
            NodeKind::Member { object, .. } => self.check_node(object),
        }
    }

    fn check_identifier_read(&mut self, node: &AstNode, name: &str) {
        if self.scopes.resolve(name).is_none() && !natives::is_native_name(name) {
            self.error(node, format!("Undefined identifier '{name}'"));
        }
    }

    fn check_assignment_target(&mut self, op: &BinaryOp, target: &AstNode) {
        match &target.kind {
            NodeKind::Identifier(name) => match self.scopes.resolve(name) {
                Some(symbol) if symbol.kind == SymbolKind::Const => {
                    self.error(target, format!("Cannot assign to constant '{name}'"));
                }
                Some(_) => {}
                None => {
                    self.error(target, format!("Assignment to undefined identifier '{name}'"));
                }
            },
            NodeKind::Index { object, index } => {
                self.check_node(object);
                self.check_node(index);
            }
            _ => {
                self.error(
                    target,
                    format!("Invalid target for '{}' assignment", op.symbol()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        lexer::{Lexer, LexerConfig},
        parser::Parser,
        token::{Token, TokenKind},
    };

    fn analyze_source(source: &str) -> SemanticReport {
        let mut lx = Lexer::new(source.as_bytes().to_vec(), LexerConfig::default());
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let tok = lx.next_token();
            let kind = tok.kind;
            tokens.push(tok);
            if matches!(kind, TokenKind::Eof | TokenKind::Error) {
                break;
            }
        }
        let (root, _) = Parser::new(&tokens).parse();
        analyze(&root)
    }

    #[test]
    fn clean_program_has_no_errors() {
        let report = analyze_source("frame Main { func main() { var a = 10; var b = 20; return a + b; } }");
        assert_eq!(report.error_count, 0, "diagnostics: {:?}", report.diagnostics);
    }

    #[test]
    fn undefined_identifier_is_counted() {
        let report = analyze_source("var x = missing + 1");
        assert_eq!(report.error_count, 1);
        assert!(report.diagnostics[0].message.contains("missing"));
    }

    #[test]
    fn natives_resolve_without_declarations() {
        let report = analyze_source("print(\"hi\"); var n = len(\"abc\")");
        assert_eq!(report.error_count, 0, "diagnostics: {:?}", report.diagnostics);
    }

    #[test]
    fn forward_function_references_are_hoisted() {
        let report = analyze_source("func a() { b() } func b() { }");
        assert_eq!(report.error_count, 0, "diagnostics: {:?}", report.diagnostics);
    }

    #[test]
    fn duplicate_declaration_in_one_scope() {
        let report = analyze_source("var x = 1; var x = 2");
        assert_eq!(report.error_count, 1);
    }

    #[test]
    fn shadowing_in_a_child_scope_is_fine() {
        let report = analyze_source("var x = 1; func f(x) { return x; }");
        assert_eq!(report.error_count, 0, "diagnostics: {:?}", report.diagnostics);
    }

    #[test]
    fn assignment_to_const_is_an_error() {
        let report = analyze_source("const k = 1; k = 2");
        assert_eq!(report.error_count, 1);
        assert!(report.diagnostics[0].message.contains("constant"));
    }

    #[test]
    fn call_to_unknown_function_is_an_error() {
        let report = analyze_source("launch()");
        assert_eq!(report.error_count, 1);
    }
}
