//! Recursive-descent parser: a flat token slice in, an AST out.
//!
//! Expressions use precedence climbing, lowest to highest: assignment
//! (right-associative) over logical-or, logical-and, bitwise or/xor/and,
//! equality, comparison, additive, multiplicative, power (right-associative),
//! unary, primary.
//!
//! The parser never fails as a whole: a failed expectation is reported on the
//! diagnostic channel and parsing continues with the current token, and a
//! statement that produces nothing causes the enclosing loop to skip one
//! token and retry. `Whitespace` and `Newline` tokens are transparent to
//! every peek and advance. Semicolons are optional terminators.

use std::rc::Rc;

use crate::{
    ast::{AstNode, BinaryOp, LiteralValue, NodeKind, UnaryOp},
    error::Diagnostic,
    location::SourceLocation,
    token::{Token, TokenKind, TokenValue},
};

/// The recursive-descent parser. Borrows the token slice for the duration of
/// one parse.
pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    eof: Token,
}

impl<'t> Parser<'t> {
    #[must_use]
    pub fn new(tokens: &'t [Token]) -> Self {
        let eof_location = tokens
            .last()
            .map_or_else(|| SourceLocation::new(1, 1, Rc::from("")), |t| t.location.clone());
        Self {
            tokens,
            pos: 0,
            diagnostics: Vec::new(),
            eof: Token::new(TokenKind::Eof, eof_location, ""),
        }
    }

    /// Parses the whole token stream. Always returns a root block, possibly
    /// partial, together with the diagnostics accumulated while recovering.
    pub fn parse(mut self) -> (AstNode, Vec<Diagnostic>) {
        let root = self.parse_program();
        (root, self.diagnostics)
    }

    // ---- token helpers ----

    fn peek(&self) -> &Token {
        let mut i = self.pos;
        while i < self.tokens.len() {
            if self.tokens[i].kind.is_trivia() {
                i += 1;
            } else {
                return &self.tokens[i];
            }
        }
        &self.eof
    }

    fn advance(&mut self) -> Token {
        while self.pos < self.tokens.len() && self.tokens[self.pos].kind.is_trivia() {
            self.pos += 1;
        }
        if self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            token
        } else {
            self.eof.clone()
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expects `kind`; on a mismatch, reports the offending token and
    /// continues with it instead of advancing.
    fn consume(&mut self, kind: TokenKind, message: &str) {
        if !self.eat(kind) {
            let token = self.peek();
            let text = token.text.clone();
            let loc = token.location.clone();
            self.diagnostics
                .push(Diagnostic::new(loc, format!("{message} (got token '{text}')")));
        }
    }

    fn report(&mut self, loc: SourceLocation, message: String) {
        self.diagnostics.push(Diagnostic::new(loc, message));
    }

    // ---- program and declarations ----

    fn parse_program(&mut self) -> AstNode {
        let loc = self.peek().location.clone();
        let mut items = Vec::new();
        while !self.check(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_declaration() {
                Some(decl) => items.push(decl),
                None => {
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        AstNode::new(NodeKind::Block(items), loc)
    }

    fn parse_declaration(&mut self) -> Option<AstNode> {
        match self.peek().kind {
            TokenKind::Frame => self.parse_frame(),
            TokenKind::Func | TokenKind::Function => self.parse_func_decl(),
            TokenKind::Class => self.parse_class_decl(),
            TokenKind::Import => self.parse_import_decl(),
            TokenKind::Var | TokenKind::Const => self.parse_var_decl(),
            _ => self.parse_statement(),
        }
    }

    /// Takes the next token as a name, reporting when it is not an
    /// identifier but still using its text so parsing can continue.
    fn expect_name(&mut self, what: &str) -> (String, SourceLocation) {
        let token = self.advance();
        if token.kind != TokenKind::Identifier {
            self.report(
                token.location.clone(),
                format!("Expected {what} name (got token '{}')", token.text),
            );
        }
        (token.text.into_string(), token.location)
    }

    fn parse_frame(&mut self) -> Option<AstNode> {
        let frame_tok = self.advance();
        let (name, _) = self.expect_name("frame");
        self.consume(TokenKind::LBrace, "Expected '{' after frame name.");

        let body = self.parse_declarations_until_rbrace();
        self.consume(TokenKind::RBrace, "Expected '}' at end of frame.");

        Some(AstNode::new(NodeKind::Frame { name, body }, frame_tok.location))
    }

    fn parse_var_decl(&mut self) -> Option<AstNode> {
        let decl_tok = self.advance();
        let is_const = decl_tok.kind == TokenKind::Const;
        let (name, _) = self.expect_name(if is_const { "constant" } else { "variable" });

        let init = if self.eat(TokenKind::Assign) {
            self.parse_expression().map(Box::new)
        } else {
            None
        };
        self.eat(TokenKind::Semicolon);

        Some(AstNode::new(NodeKind::VarDecl { name, is_const, init }, decl_tok.location))
    }

    fn parse_func_decl(&mut self) -> Option<AstNode> {
        let func_tok = self.advance();
        let (name, _) = self.expect_name("function");

        self.consume(TokenKind::LParen, "Expected '(' after function name.");
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) && !self.check(TokenKind::Eof) {
            let param = self.advance();
            if param.kind != TokenKind::Identifier {
                self.report(
                    param.location.clone(),
                    format!("Expected parameter name (got token '{}')", param.text),
                );
            }
            params.push(param.text.into_string());
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RParen, "Expected ')' after parameters.");

        let body = self.parse_block_required("function body");

        Some(AstNode::new(
            NodeKind::FuncDecl {
                name,
                params,
                body: Box::new(body),
            },
            func_tok.location,
        ))
    }

    fn parse_class_decl(&mut self) -> Option<AstNode> {
        let class_tok = self.advance();
        let (name, _) = self.expect_name("class");
        self.consume(TokenKind::LBrace, "Expected '{' after class name.");

        let members = self.parse_declarations_until_rbrace();
        self.consume(TokenKind::RBrace, "Expected '}' after class body.");

        Some(AstNode::new(NodeKind::ClassDecl { name, members }, class_tok.location))
    }

    fn parse_import_decl(&mut self) -> Option<AstNode> {
        let import_tok = self.advance();
        let module = self.advance();
        if module.kind != TokenKind::Str {
            self.report(
                module.location.clone(),
                format!("Expected module path string after 'import' (got token '{}')", module.text),
            );
        }
        self.eat(TokenKind::Semicolon);

        let path = match &module.value {
            TokenValue::Str(s) => s.to_string(),
            _ => module.text.into_string(),
        };
        Some(AstNode::new(NodeKind::Import { path }, import_tok.location))
    }

    fn parse_declarations_until_rbrace(&mut self) -> Vec<AstNode> {
        let mut items = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_declaration() {
                Some(decl) => items.push(decl),
                None => {
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        items
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Option<AstNode> {
        match self.peek().kind {
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::While => self.parse_while_stmt(),
            TokenKind::For => self.parse_for_stmt(),
            TokenKind::Switch => self.parse_switch_stmt(),
            TokenKind::Try => self.parse_try_catch_stmt(),
            TokenKind::OnError => self.parse_on_error_stmt(),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::LBrace => Some(self.parse_block()),
            _ => self.parse_expression_stmt(),
        }
    }

    /// Parses `{ statements }` with the brace as the current token.
    fn parse_block(&mut self) -> AstNode {
        let brace = self.advance();
        let mut stmts = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_statement() {
                Some(stmt) => stmts.push(stmt),
                None => {
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after block.");
        AstNode::new(NodeKind::Block(stmts), brace.location)
    }

    /// Parses a block, reporting when the opening brace is missing and
    /// producing an empty block in its place.
    fn parse_block_required(&mut self, what: &str) -> AstNode {
        if self.check(TokenKind::LBrace) {
            self.parse_block()
        } else {
            let loc = self.peek().location.clone();
            let text = self.peek().text.clone();
            self.report(loc.clone(), format!("Expected '{{' before {what} (got token '{text}')"));
            AstNode::new(NodeKind::Block(Vec::new()), loc)
        }
    }

    fn parse_expression_stmt(&mut self) -> Option<AstNode> {
        let expr = self.parse_expression()?;
        self.eat(TokenKind::Semicolon);
        let loc = expr.loc.clone();
        Some(AstNode::new(NodeKind::ExprStmt(Box::new(expr)), loc))
    }

    fn parse_if_stmt(&mut self) -> Option<AstNode> {
        let if_tok = self.advance();
        self.consume(TokenKind::LParen, "Expected '(' after 'if'.");
        let cond = self.parse_expression_or_hole();
        self.consume(TokenKind::RParen, "Expected ')' after if condition.");

        let then_branch = self.parse_statement_or_empty();
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_statement_or_empty()))
        } else {
            None
        };

        Some(AstNode::new(
            NodeKind::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch,
            },
            if_tok.location,
        ))
    }

    fn parse_while_stmt(&mut self) -> Option<AstNode> {
        let while_tok = self.advance();
        self.consume(TokenKind::LParen, "Expected '(' after 'while'.");
        let cond = self.parse_expression_or_hole();
        self.consume(TokenKind::RParen, "Expected ')' after while condition.");
        let body = self.parse_statement_or_empty();

        Some(AstNode::new(
            NodeKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            while_tok.location,
        ))
    }

    fn parse_for_stmt(&mut self) -> Option<AstNode> {
        let for_tok = self.advance();
        self.consume(TokenKind::LParen, "Expected '(' after 'for'.");
        let init = self.parse_expression_or_hole();
        self.consume(TokenKind::Semicolon, "Expected ';' after for initializer.");
        let cond = self.parse_expression_or_hole();
        self.consume(TokenKind::Semicolon, "Expected ';' after for condition.");
        let incr = self.parse_expression_or_hole();
        self.consume(TokenKind::RParen, "Expected ')' after for clauses.");
        let body = self.parse_statement_or_empty();

        Some(AstNode::new(
            NodeKind::For {
                init: Box::new(init),
                cond: Box::new(cond),
                incr: Box::new(incr),
                body: Box::new(body),
            },
            for_tok.location,
        ))
    }

    fn parse_switch_stmt(&mut self) -> Option<AstNode> {
        let switch_tok = self.advance();
        self.consume(TokenKind::LParen, "Expected '(' after 'switch'.");
        let scrutinee = self.parse_expression_or_hole();
        self.consume(TokenKind::RParen, "Expected ')' after switch expr.");

        self.consume(TokenKind::LBrace, "Expected '{' after switch(...).");
        let mut cases = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let before = self.pos;
            match self.parse_statement() {
                Some(stmt) => cases.push(stmt),
                None => {
                    if self.pos == before {
                        self.advance();
                    }
                }
            }
        }
        self.consume(TokenKind::RBrace, "Expected '}' after switch.");

        let case_block = AstNode::new(NodeKind::Block(cases), switch_tok.location.clone());
        Some(AstNode::new(
            NodeKind::Switch {
                scrutinee: Box::new(scrutinee),
                cases: Box::new(case_block),
            },
            switch_tok.location,
        ))
    }

    fn parse_try_catch_stmt(&mut self) -> Option<AstNode> {
        let try_tok = self.advance();
        let try_body = self.parse_statement_or_empty();
        let catch_body = if self.eat(TokenKind::Catch) {
            Some(Box::new(self.parse_statement_or_empty()))
        } else {
            None
        };

        Some(AstNode::new(
            NodeKind::TryCatch {
                try_body: Box::new(try_body),
                catch_body,
            },
            try_tok.location,
        ))
    }

    fn parse_on_error_stmt(&mut self) -> Option<AstNode> {
        let tok = self.advance();
        let body = self.parse_block_required("on_error block");
        Some(AstNode::new(NodeKind::OnError { body: Box::new(body) }, tok.location))
    }

    fn parse_return_stmt(&mut self) -> Option<AstNode> {
        let tok = self.advance();
        let value = if matches!(
            self.peek().kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) {
            None
        } else {
            self.parse_expression().map(Box::new)
        };
        self.eat(TokenKind::Semicolon);
        Some(AstNode::new(NodeKind::Return { value }, tok.location))
    }

    fn parse_statement_or_empty(&mut self) -> AstNode {
        let loc = self.peek().location.clone();
        self.parse_statement()
            .unwrap_or_else(|| AstNode::new(NodeKind::Block(Vec::new()), loc))
    }

    /// An expression, or a `null` literal hole when nothing parses.
    fn parse_expression_or_hole(&mut self) -> AstNode {
        let loc = self.peek().location.clone();
        self.parse_expression()
            .unwrap_or_else(|| AstNode::new(NodeKind::Literal(LiteralValue::Null), loc))
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> Option<AstNode> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Option<AstNode> {
        let left = self.parse_logical_or()?;
        let kind = self.peek().kind;
        if let Some(op) = BinaryOp::from_token(kind)
            && op.is_assignment()
        {
            let op_tok = self.advance();
            // Right-associative: a = b = c parses as a = (b = c).
            let Some(right) = self.parse_assignment() else {
                return Some(left);
            };
            return Some(AstNode::new(
                NodeKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                op_tok.location,
            ));
        }
        Some(left)
    }

    fn parse_binary_level(
        &mut self,
        operators: &[TokenKind],
        next: fn(&mut Self) -> Option<AstNode>,
    ) -> Option<AstNode> {
        let mut node = next(self)?;
        loop {
            let kind = self.peek().kind;
            if !operators.contains(&kind) {
                return Some(node);
            }
            let Some(op) = BinaryOp::from_token(kind) else {
                return Some(node);
            };
            let op_tok = self.advance();
            let Some(rhs) = next(self) else {
                return Some(node);
            };
            node = AstNode::new(
                NodeKind::Binary {
                    op,
                    left: Box::new(node),
                    right: Box::new(rhs),
                },
                op_tok.location,
            );
        }
    }

    fn parse_logical_or(&mut self) -> Option<AstNode> {
        self.parse_binary_level(&[TokenKind::OrOr], Self::parse_logical_and)
    }

    fn parse_logical_and(&mut self) -> Option<AstNode> {
        self.parse_binary_level(&[TokenKind::AndAnd], Self::parse_bitwise_or)
    }

    fn parse_bitwise_or(&mut self) -> Option<AstNode> {
        self.parse_binary_level(&[TokenKind::BitOr], Self::parse_bitwise_xor)
    }

    fn parse_bitwise_xor(&mut self) -> Option<AstNode> {
        self.parse_binary_level(&[TokenKind::BitXor], Self::parse_bitwise_and)
    }

    fn parse_bitwise_and(&mut self) -> Option<AstNode> {
        self.parse_binary_level(&[TokenKind::BitAnd], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Option<AstNode> {
        self.parse_binary_level(&[TokenKind::EqEq, TokenKind::NotEq], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> Option<AstNode> {
        self.parse_binary_level(
            &[TokenKind::Lt, TokenKind::Gt, TokenKind::LtEq, TokenKind::GtEq],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Option<AstNode> {
        self.parse_binary_level(&[TokenKind::Plus, TokenKind::Minus], Self::parse_factor)
    }

    fn parse_factor(&mut self) -> Option<AstNode> {
        self.parse_binary_level(
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
            Self::parse_power,
        )
    }

    fn parse_power(&mut self) -> Option<AstNode> {
        let base = self.parse_unary()?;
        if self.check(TokenKind::Pow) {
            let op_tok = self.advance();
            // Right-associative: 2 ** 3 ** 2 is 2 ** (3 ** 2).
            let Some(rhs) = self.parse_power() else {
                return Some(base);
            };
            return Some(AstNode::new(
                NodeKind::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(base),
                    right: Box::new(rhs),
                },
                op_tok.location,
            ));
        }
        Some(base)
    }

    fn parse_unary(&mut self) -> Option<AstNode> {
        if let Some(op) = UnaryOp::from_token(self.peek().kind) {
            let op_tok = self.advance();
            let operand = self.parse_unary()?;
            return Some(AstNode::new(
                NodeKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                op_tok.location,
            ));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Option<AstNode> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Docstring => {
                self.advance();
                let text: Rc<str> = match token.value {
                    TokenValue::Str(s) => s,
                    _ => Rc::from(&*token.text),
                };
                Some(AstNode::new(NodeKind::Docstring(text), token.location))
            }
            TokenKind::Regex => {
                self.advance();
                let text: Rc<str> = match token.value {
                    TokenValue::Str(s) => s,
                    _ => Rc::from(&*token.text),
                };
                Some(AstNode::new(NodeKind::Regex(text), token.location))
            }
            TokenKind::InterpolationStart => {
                self.advance();
                let inner = self.parse_expression();
                self.consume(
                    TokenKind::InterpolationEnd,
                    "Expected '}' after interpolation expression.",
                );
                inner.map(|expr| AstNode::new(NodeKind::Interpolation(Box::new(expr)), token.location))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression();
                self.consume(TokenKind::RParen, "Expected ')' after parenthesized expr.");
                expr
            }
            TokenKind::Int => {
                self.advance();
                let value = token.value.as_int().unwrap_or_default();
                Some(AstNode::new(NodeKind::Literal(LiteralValue::Int(value)), token.location))
            }
            TokenKind::Float => {
                self.advance();
                let value = match token.value {
                    TokenValue::Float(f) => f,
                    _ => 0.0,
                };
                Some(AstNode::new(
                    NodeKind::Literal(LiteralValue::Float(value)),
                    token.location,
                ))
            }
            TokenKind::Str => {
                self.advance();
                let text: Rc<str> = match token.value {
                    TokenValue::Str(s) => s,
                    _ => Rc::from(&*token.text),
                };
                Some(AstNode::new(
                    NodeKind::Literal(LiteralValue::Str(text)),
                    token.location,
                ))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                let value = token.kind == TokenKind::True;
                Some(AstNode::new(
                    NodeKind::Literal(LiteralValue::Bool(value)),
                    token.location,
                ))
            }
            TokenKind::Null => {
                self.advance();
                Some(AstNode::new(NodeKind::Literal(LiteralValue::Null), token.location))
            }
            TokenKind::Identifier => {
                self.advance();
                let node = AstNode::new(NodeKind::Identifier(token.text.into_string()), token.location);
                Some(self.parse_postfix_tails(node))
            }
            _ => {
                self.report(
                    token.location.clone(),
                    format!("unexpected token '{}'", token.text),
                );
                self.advance();
                None
            }
        }
    }

    /// Left-associative postfix tails on an identifier: `(args)`, `[index]`,
    /// and `.member`, chained in any order.
    fn parse_postfix_tails(&mut self, mut node: AstNode) -> AstNode {
        loop {
            if self.check(TokenKind::LParen) {
                let paren = self.advance();
                let mut args = Vec::new();
                while !self.check(TokenKind::RParen) && !self.check(TokenKind::Eof) {
                    let Some(arg) = self.parse_expression() else {
                        break;
                    };
                    args.push(arg);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.consume(TokenKind::RParen, "Expected ')' after call arguments.");
                node = AstNode::new(
                    NodeKind::Call {
                        callee: Box::new(node),
                        args,
                    },
                    paren.location,
                );
            } else if self.check(TokenKind::LBracket) {
                let bracket = self.advance();
                let index = self.parse_expression_or_hole();
                self.consume(TokenKind::RBracket, "Expected ']' after index expression.");
                node = AstNode::new(
                    NodeKind::Index {
                        object: Box::new(node),
                        index: Box::new(index),
                    },
                    bracket.location,
                );
            } else if self.check(TokenKind::Dot) {
                let dot = self.advance();
                let (member, _) = self.expect_name("member");
                node = AstNode::new(
                    NodeKind::Member {
                        object: Box::new(node),
                        member,
                    },
                    dot.location,
                );
            } else {
                return node;
            }
        }
    }
}
