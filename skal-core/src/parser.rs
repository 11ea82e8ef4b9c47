//! Recursive-descent parser with panic-mode recovery.
//!
//! Structural errors inside a declaration are recorded as diagnostics
//! and the parser resynchronizes at the next statement boundary, so a
//! broken declaration costs one diagnostic instead of a cascade. List
//! limits (arguments, parameters, struct fields past 32 entries) are
//! softer still: reported, and the list keeps being consumed with every
//! entry retained.

use crate::ast::{CallArgument, Expr, ExprId, ExprKind, Parameter, Stmt};
use crate::diagnostic::Diagnostic;
use crate::token::{Literal, Token, TokenKind};

const MAX_ARGS: usize = 32;
const MAX_ARGS_MESSAGE: &str = "can't have more than 32 arguments in a function";

/// Result of parsing a token stream.
///
/// `next_id` is the first unused [`ExprId`]; a session feeds it back
/// into [`parse_from`] so ids stay unique across REPL lines.
#[derive(Debug)]
pub struct ParseResult {
    pub stmts: Vec<Stmt>,
    pub diagnostics: Vec<Diagnostic>,
    pub next_id: ExprId,
}

/// Whether the parser currently sits at the top level or inside a
/// function body. `return` is only legal under [`ScopeKind::Func`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Func,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IfKind {
    /// `if` in expression position: both branches required.
    Anonymous,
    /// `if` in statement position: `else` may be absent.
    Statement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FuncKind {
    Common,
    Anonymous,
}

/// Parse a token stream into statements.
///
/// With `repl` set, bare statements and expressions are accepted at the
/// top level; otherwise only declarations are.
pub fn parse(tokens: Vec<Token>, repl: bool) -> ParseResult {
    parse_from(tokens, repl, ExprId(0))
}

pub fn parse_from(tokens: Vec<Token>, repl: bool, first_id: ExprId) -> ParseResult {
    let mut parser = Parser {
        tokens,
        current: 0,
        repl,
        next_id: first_id.0,
        diagnostics: Vec::new(),
    };
    parser.run()
}

/// Marker raised after a diagnostic has been recorded; unwinds to the
/// enclosing declaration, which synchronizes and moves on.
struct ParseInterrupt;

type Parsed<T> = Result<T, ParseInterrupt>;

struct Parser {
    tokens: Vec<Token>,
    current: usize,
    repl: bool,
    next_id: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Parser {
    fn run(&mut self) -> ParseResult {
        let mut stmts = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                stmts.push(stmt);
            }
        }

        ParseResult {
            stmts,
            diagnostics: core::mem::take(&mut self.diagnostics),
            next_id: ExprId(self.next_id),
        }
    }

    // statements

    fn declaration(&mut self) -> Option<Stmt> {
        match self.declaration_inner() {
            Ok(stmt) => Some(stmt),
            Err(ParseInterrupt) => {
                // panic mode
                self.synchronize();
                None
            }
        }
    }

    fn declaration_inner(&mut self) -> Parsed<Stmt> {
        if self.match_kind(TokenKind::Val) {
            return self.val_declaration(ScopeKind::Global);
        }
        if self.match_kind(TokenKind::Var) {
            return self.var_declaration(ScopeKind::Global);
        }
        if self.match_kind(TokenKind::Typedef) {
            return self.type_declaration();
        }
        if self.match_kind(TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.block(ScopeKind::Global)?));
        }
        if self.match_kind(TokenKind::Func) {
            let expr = self.func_expr(FuncKind::Common, false)?;
            return Ok(Stmt::Expr(expr));
        }
        if self.match_kind(TokenKind::External) {
            return self.external_declaration();
        }
        if self.match_kind(TokenKind::Comment) {
            return Ok(Stmt::Comment(self.previous().lexeme.clone()));
        }

        if self.repl {
            self.statement(ScopeKind::Global)
        } else {
            Err(self.error("expecting a declaration"))
        }
    }

    fn statement(&mut self, scope: ScopeKind) -> Parsed<Stmt> {
        if self.match_kind(TokenKind::Return) {
            return match scope {
                ScopeKind::Global => {
                    let token = self.previous().clone();
                    Err(self.error_at(token, "not expecting 'return' outside of a function"))
                }
                ScopeKind::Func => self.return_statement(scope),
            };
        }
        if self.match_kind(TokenKind::Val) {
            return self.val_declaration(scope);
        }
        if self.match_kind(TokenKind::Var) {
            return self.var_declaration(scope);
        }
        if self.match_kind(TokenKind::Typedef) {
            return self.type_declaration();
        }
        if self.match_kind(TokenKind::While) {
            return self.while_statement(scope);
        }
        if self.match_kind(TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.block(scope)?));
        }
        if self.match_kind(TokenKind::If) {
            let expr = self.if_expr(IfKind::Statement, scope)?;
            return Ok(Stmt::Expr(expr));
        }
        if self.match_kind(TokenKind::Func) {
            let expr = self.func_expr(FuncKind::Common, false)?;
            return Ok(Stmt::Expr(expr));
        }
        if self.match_kind(TokenKind::Comment) {
            return Ok(Stmt::Comment(self.previous().lexeme.clone()));
        }

        self.expr_statement(scope)
    }

    fn block(&mut self, scope: ScopeKind) -> Parsed<Vec<Stmt>> {
        let mut stmts = Vec::new();

        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            stmts.push(self.statement(scope)?);
        }

        self.expect(TokenKind::RightBrace, "end of block")?;

        Ok(stmts)
    }

    fn val_declaration(&mut self, scope: ScopeKind) -> Parsed<Stmt> {
        let name = self.expect(TokenKind::Identifier, "a declaration name")?;
        let ty = self.type_annotation()?;
        let value = self.initializer(scope)?;

        Ok(Stmt::Val { name, ty, value })
    }

    fn var_declaration(&mut self, scope: ScopeKind) -> Parsed<Stmt> {
        let name = self.expect(TokenKind::Identifier, "a declaration name")?;
        let ty = self.type_annotation()?;
        let value = self.initializer(scope)?;

        Ok(Stmt::Var { name, ty, value })
    }

    fn initializer(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        if !self.match_kind(TokenKind::Equal) {
            return Err(self.error("expecting an initializer"));
        }

        let value = self.expression(scope)?;
        self.expect(TokenKind::Semicolon, "';'")?;

        Ok(value)
    }

    fn type_annotation(&mut self) -> Parsed<Option<Token>> {
        if self.match_kind(TokenKind::Colon) {
            Ok(Some(self.expect(TokenKind::Identifier, "a type name")?))
        } else {
            Ok(None)
        }
    }

    fn type_declaration(&mut self) -> Parsed<Stmt> {
        self.expect(TokenKind::Struct, "'struct'")?;
        let name = self.expect(TokenKind::Identifier, "a struct name")?;

        let fields = if self.match_kind(TokenKind::Semicolon) {
            Vec::new()
        } else if self.match_kind(TokenKind::LeftParen) {
            let fields = self.parameters()?;
            self.expect(TokenKind::Semicolon, "';'")?;
            fields
        } else {
            return Err(self.error("expecting ';' or a field list"));
        };

        Ok(Stmt::StructDef { name, fields })
    }

    fn return_statement(&mut self, scope: ScopeKind) -> Parsed<Stmt> {
        // a value-less return yields Unit
        let expr = if !self.check(TokenKind::Semicolon) {
            self.expression(scope)?
        } else {
            self.make(ExprKind::Literal {
                value: Literal::Unit,
            })
        };

        self.expect(TokenKind::Semicolon, "';'")?;

        Ok(Stmt::Return(expr))
    }

    fn while_statement(&mut self, scope: ScopeKind) -> Parsed<Stmt> {
        let condition = self.expression(scope)?;

        if !self.match_kind(TokenKind::LeftBrace) {
            return Err(self.error("expecting start of while body"));
        }

        let body = self.block(scope)?;

        Ok(Stmt::While { condition, body })
    }

    fn expr_statement(&mut self, scope: ScopeKind) -> Parsed<Stmt> {
        let expr = self.expression(scope)?;
        self.expect(TokenKind::Semicolon, "';' after expression")?;

        Ok(Stmt::Expr(expr))
    }

    // expressions

    fn expression(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        self.assignment(scope)
    }

    fn assignment(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        if self.match_kind(TokenKind::If) {
            return self.if_expr(IfKind::Anonymous, scope);
        }
        if self.match_kind(TokenKind::Func) {
            return self.func_expr(FuncKind::Anonymous, false);
        }

        let expr = self.or(scope)?;

        if self.match_kind(TokenKind::Equal) {
            let equals = self.previous().clone();
            let value = self.assignment(scope)?;

            let (id, line) = (expr.id, expr.line);
            return Ok(match expr.kind {
                ExprKind::Var { name } => self.make(ExprKind::Assign {
                    name,
                    value: Box::new(value),
                }),
                ExprKind::Get { receiver, name } => self.make(ExprKind::Set {
                    receiver,
                    name,
                    value: Box::new(value),
                }),
                kind => {
                    // reported but not raised, so parsing continues
                    // past the bad target
                    self.report_at(&equals, "invalid right-associative assignment");
                    Expr { id, line, kind }
                }
            });
        }

        Ok(expr)
    }

    fn if_expr(&mut self, kind: IfKind, scope: ScopeKind) -> Parsed<Expr> {
        let condition = self.expression(scope)?;

        if !self.match_kind(TokenKind::LeftBrace) {
            return Err(self.error("expecting start of if body"));
        }
        let then_branch = self.block(scope)?;

        let else_branch = if self.match_kind(TokenKind::Else) {
            if !self.match_kind(TokenKind::LeftBrace) {
                return Err(self.error("expecting start of else body"));
            }
            Some(self.block(scope)?)
        } else {
            None
        };

        if kind == IfKind::Anonymous && else_branch.is_none() {
            return Err(self.error("expecting an else body on an if expression"));
        }

        Ok(self.make(ExprKind::If {
            condition: Box::new(condition),
            then_branch,
            else_branch,
        }))
    }

    fn func_expr(&mut self, kind: FuncKind, native: bool) -> Parsed<Expr> {
        let name = self.consume(TokenKind::Identifier);

        if self.match_kind(TokenKind::Identifier) {
            let receiver = match name {
                Some(receiver) => receiver,
                None => return Err(self.error("expecting a function name")),
            };
            return self.extension_func_expr(receiver, native);
        }

        if self.consume(TokenKind::LeftParen).is_none() {
            return Err(self.error("expecting start of arguments"));
        }

        let parameters = self.parameters()?;
        let return_type = self.type_annotation()?;

        if native {
            let name = match name {
                Some(name) => name,
                None => return Err(self.error("expecting a function name")),
            };
            let expr = self.make(ExprKind::NativeFunc {
                name,
                parameters,
                return_type,
            });
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(expr);
        }

        let body = self.func_body(kind)?;

        match kind {
            FuncKind::Anonymous => Ok(self.make(ExprKind::AnonymousFunc {
                parameters,
                return_type,
                body,
            })),
            FuncKind::Common => {
                let name = match name {
                    Some(name) => name,
                    None => return Err(self.error("expecting a function name")),
                };
                Ok(self.make(ExprKind::CommonFunc {
                    name,
                    parameters,
                    return_type,
                    body,
                }))
            }
        }
    }

    fn extension_func_expr(&mut self, receiver: Token, native: bool) -> Parsed<Expr> {
        let name = self.previous().clone();

        if self.consume(TokenKind::LeftParen).is_none() {
            return Err(self.error("expecting start of arguments"));
        }

        let parameters = self.parameters()?;
        let return_type = self.type_annotation()?;

        if native {
            let expr = self.make(ExprKind::NativeFunc {
                name,
                parameters,
                return_type,
            });
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(expr);
        }

        let body = self.func_body(FuncKind::Common)?;

        Ok(self.make(ExprKind::ExtensionFunc {
            receiver,
            name,
            parameters,
            return_type,
            body,
        }))
    }

    fn func_body(&mut self, kind: FuncKind) -> Parsed<Vec<Stmt>> {
        if self.consume(TokenKind::LeftBrace).is_some() {
            return self.block(ScopeKind::Func);
        }
        if self.consume(TokenKind::Equal).is_some() {
            // `= expr` shorthand desugars to a single return
            let value = self.expression(ScopeKind::Func)?;
            let body = vec![Stmt::Return(value)];
            if kind == FuncKind::Common {
                self.expect(TokenKind::Semicolon, "';'")?;
            }
            return Ok(body);
        }

        Err(self.error("expecting start of a function body"))
    }

    fn parameters(&mut self) -> Parsed<Vec<Parameter>> {
        let mut parameters = Vec::new();

        if !self.check(TokenKind::RightParen) {
            loop {
                if parameters.len() >= MAX_ARGS {
                    self.report_limit();
                }
                let name = self.expect(TokenKind::Identifier, "a parameter name")?;
                self.expect(TokenKind::Colon, "':'")?;
                let ty = self.expect(TokenKind::Identifier, "a parameter type")?;
                parameters.push(Parameter { name, ty });

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RightParen, "end of arguments")?;

        Ok(parameters)
    }

    fn external_declaration(&mut self) -> Parsed<Stmt> {
        self.expect(TokenKind::Func, "'func'")?;
        let expr = self.func_expr(FuncKind::Common, true)?;

        Ok(Stmt::Expr(expr))
    }

    fn or(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        let mut expr = self.and(scope)?;

        while self.match_kind(TokenKind::Or) {
            let op = self.previous().clone();
            let right = self.and(scope)?;

            expr = self.make(ExprKind::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn and(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        let mut expr = self.equality(scope)?;

        while self.match_kind(TokenKind::And) {
            let op = self.previous().clone();
            let right = self.equality(scope)?;

            expr = self.make(ExprKind::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn equality(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        let mut expr = self.comparison(scope)?;

        while self.match_kinds(&[TokenKind::BangEqual, TokenKind::EqualEqual]) {
            let op = self.previous().clone();
            let right = self.comparison(scope)?;

            expr = self.make(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn comparison(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        let mut expr = self.term(scope)?;

        while self.match_kinds(&[
            TokenKind::GreaterEqual,
            TokenKind::Greater,
            TokenKind::Less,
            TokenKind::LessEqual,
        ]) {
            let op = self.previous().clone();
            let right = self.term(scope)?;

            expr = self.make(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn term(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        let mut expr = self.factor(scope)?;

        while self.match_kinds(&[TokenKind::Minus, TokenKind::Plus]) {
            let op = self.previous().clone();
            let right = self.factor(scope)?;

            expr = self.make(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn factor(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        let mut expr = self.unary(scope)?;

        while self.match_kinds(&[TokenKind::Slash, TokenKind::Star]) {
            let op = self.previous().clone();
            let right = self.unary(scope)?;

            expr = self.make(ExprKind::Binary {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }

        Ok(expr)
    }

    fn unary(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        if self.match_kinds(&[TokenKind::Bang, TokenKind::Minus, TokenKind::Plus]) {
            let op = self.previous().clone();
            let right = self.unary(scope)?;

            return Ok(self.make(ExprKind::Unary {
                op,
                right: Box::new(right),
            }));
        }

        self.call(scope)
    }

    fn call(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        let mut expr = self.primary(scope)?;

        loop {
            if self.match_kind(TokenKind::LeftParen) {
                expr = self.finish_call(expr, scope)?;
            } else if self.match_kind(TokenKind::Dot) {
                let name = self.expect(TokenKind::Identifier, "an identifier after '.'")?;
                expr = self.make(ExprKind::Get {
                    receiver: Box::new(expr),
                    name,
                });
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr, scope: ScopeKind) -> Parsed<Expr> {
        let mut arguments = Vec::new();

        if !self.check(TokenKind::RightParen) {
            loop {
                if arguments.len() >= MAX_ARGS {
                    self.report_limit();
                }
                let name = if self.check(TokenKind::Identifier)
                    && self.check_next(TokenKind::Colon)
                {
                    let name = self.advance();
                    self.advance(); // ':'
                    Some(name)
                } else {
                    None
                };
                let value = self.expression(scope)?;
                arguments.push(CallArgument { name, value });

                if !self.match_kind(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RightParen, "')'")?;

        Ok(self.make(ExprKind::Call {
            callee: Box::new(callee),
            arguments,
        }))
    }

    fn primary(&mut self, scope: ScopeKind) -> Parsed<Expr> {
        if self.match_kind(TokenKind::False) {
            return Ok(self.make(ExprKind::Literal {
                value: Literal::Bool(false),
            }));
        }
        if self.match_kind(TokenKind::True) {
            return Ok(self.make(ExprKind::Literal {
                value: Literal::Bool(true),
            }));
        }
        if self.match_kind(TokenKind::This) {
            let keyword = self.previous().clone();
            return Ok(self.make(ExprKind::This { keyword }));
        }
        if self.match_kinds(&[TokenKind::Double, TokenKind::String, TokenKind::Int]) {
            let value = self
                .previous()
                .literal
                .clone()
                .unwrap_or(Literal::String(String::new()));
            return Ok(self.make(ExprKind::Literal { value }));
        }
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.expression(scope)?;
            self.expect(TokenKind::RightParen, "')'")?;
            return Ok(self.make(ExprKind::Grouping {
                expr: Box::new(expr),
            }));
        }
        if self.match_kind(TokenKind::Identifier) {
            let name = self.previous().clone();
            return Ok(self.make(ExprKind::Var { name }));
        }

        Err(self.error("expecting an expression"))
    }

    // utils

    fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }

            match self.peek().kind {
                TokenKind::Struct
                | TokenKind::Func
                | TokenKind::Val
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::Return
                | TokenKind::Var => return,
                _ => {}
            }

            self.advance();
        }
    }

    fn make(&mut self, kind: ExprKind) -> Expr {
        let id = ExprId(self.next_id);
        self.next_id += 1;
        let line = if self.current > 0 {
            self.previous().line
        } else {
            self.peek().line
        };
        Expr { id, line, kind }
    }

    fn consume(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            return Some(self.advance());
        }

        None
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Parsed<Token> {
        match self.consume(kind) {
            Some(token) => Ok(token),
            None => Err(self.error(format!("expecting {what}"))),
        }
    }

    fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }

        false
    }

    fn match_kinds(&mut self, kinds: &[TokenKind]) -> bool {
        for kind in kinds {
            if self.check(*kind) {
                self.advance();
                return true;
            }
        }

        false
    }

    fn check(&self, kind: TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }

        self.peek().kind == kind
    }

    fn check_next(&self, kind: TokenKind) -> bool {
        !self.is_at_end()
            && self
                .tokens
                .get(self.current + 1)
                .is_some_and(|token| token.kind == kind)
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous().clone()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn error(&mut self, message: impl Into<String>) -> ParseInterrupt {
        let token = self.peek().clone();
        self.error_at(token, message)
    }

    fn error_at(&mut self, token: Token, message: impl Into<String>) -> ParseInterrupt {
        self.diagnostics.push(Diagnostic::error_at(&token, message));
        ParseInterrupt
    }

    fn report_at(&mut self, token: &Token, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::error_at(token, message));
    }

    fn report_limit(&mut self) {
        let line = self.peek().line;
        self.diagnostics
            .push(Diagnostic::warning(MAX_ARGS_MESSAGE, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Severity;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> ParseResult {
        parse(lex(source).tokens, true)
    }

    fn single_expr(source: &str) -> Expr {
        let result = parse_source(source);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
        match result.stmts.into_iter().next() {
            Some(Stmt::Expr(expr)) => expr,
            other => panic!("expected an expression statement, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = single_expr("1 + 2 * 3;");
        let ExprKind::Binary { left, op, right } = expr.kind else {
            panic!("expected a binary expression");
        };
        assert_eq!(op.kind, TokenKind::Plus);
        assert!(matches!(left.kind, ExprKind::Literal { .. }));
        let ExprKind::Binary { op: inner_op, .. } = right.kind else {
            panic!("expected a nested binary on the right");
        };
        assert_eq!(inner_op.kind, TokenKind::Star);
    }

    #[test]
    fn subtraction_is_left_associative() {
        let expr = single_expr("10 - 3 - 2;");
        let ExprKind::Binary { left, op, right } = expr.kind else {
            panic!("expected a binary expression");
        };
        assert_eq!(op.kind, TokenKind::Minus);
        assert!(matches!(left.kind, ExprKind::Binary { .. }));
        assert!(matches!(right.kind, ExprKind::Literal { .. }));
    }

    #[test]
    fn parses_typed_val_declaration() {
        let result = parse_source("val x: Int = 10;");
        assert!(result.diagnostics.is_empty());
        let Stmt::Val { name, ty, .. } = &result.stmts[0] else {
            panic!("expected a val declaration");
        };
        assert_eq!(name.lexeme, "x");
        assert_eq!(ty.as_ref().map(|t| t.lexeme.as_str()), Some("Int"));
    }

    #[test]
    fn parses_struct_declaration() {
        let result = parse_source("typedef struct Point(x: Int, y: Int);");
        assert!(result.diagnostics.is_empty());
        let Stmt::StructDef { name, fields } = &result.stmts[0] else {
            panic!("expected a struct declaration");
        };
        assert_eq!(name.lexeme, "Point");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].ty.lexeme, "Int");
    }

    #[test]
    fn parses_function_with_shorthand_body() {
        let result = parse_source("func double(x: Int): Int = x * 2;");
        assert!(result.diagnostics.is_empty());
        let Stmt::Expr(expr) = &result.stmts[0] else {
            panic!("expected a declaration statement");
        };
        let ExprKind::CommonFunc { name, body, .. } = &expr.kind else {
            panic!("expected a function declaration");
        };
        assert_eq!(name.lexeme, "double");
        assert!(matches!(body[0], Stmt::Return(_)));
    }

    #[test]
    fn parses_extension_function() {
        let result = parse_source("func Point norm(): Int { return this.x; }");
        assert!(result.diagnostics.is_empty());
        let Stmt::Expr(expr) = &result.stmts[0] else {
            panic!("expected a declaration statement");
        };
        let ExprKind::ExtensionFunc { receiver, name, .. } = &expr.kind else {
            panic!("expected an extension function");
        };
        assert_eq!(receiver.lexeme, "Point");
        assert_eq!(name.lexeme, "norm");
    }

    #[test]
    fn parses_native_function() {
        let result = parse_source("external func clock(): Double;");
        assert!(result.diagnostics.is_empty());
        let Stmt::Expr(expr) = &result.stmts[0] else {
            panic!("expected a declaration statement");
        };
        assert!(matches!(expr.kind, ExprKind::NativeFunc { .. }));
    }

    #[test]
    fn parses_named_call_arguments() {
        let expr = single_expr("f(x: 1, 2);");
        let ExprKind::Call { arguments, .. } = expr.kind else {
            panic!("expected a call");
        };
        assert_eq!(arguments.len(), 2);
        assert_eq!(arguments[0].name.as_ref().map(|t| t.lexeme.as_str()), Some("x"));
        assert!(arguments[1].name.is_none());
    }

    #[test]
    fn rejects_return_at_top_level() {
        let result = parse_source("return 1;");
        assert!(result.stmts.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].message.contains("not expecting 'return'"));
    }

    #[test]
    fn if_expression_requires_else() {
        let result = parse_source("val x = if true { 1; };");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.message.contains("else body"))
        );
    }

    #[test]
    fn if_statement_may_omit_else() {
        let result = parse_source("if true { 1; }");
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.stmts.len(), 1);
    }

    #[test]
    fn reports_invalid_assignment_target_and_continues() {
        let result = parse_source("1 + 2 = 3;\nval x = 1;");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.message.contains("invalid right-associative assignment"))
        );
        // the following declaration still parsed
        assert!(result.stmts.iter().any(|s| matches!(s, Stmt::Val { .. })));
    }

    #[test]
    fn recovers_once_per_broken_declaration() {
        let result = parse_source("val = 3;\nval y = 2;");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.stmts.len(), 1);
        assert!(matches!(&result.stmts[0], Stmt::Val { name, .. } if name.lexeme == "y"));
    }

    #[test]
    fn call_with_33_arguments_warns_but_keeps_all() {
        let arguments = (0..33).map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
        let result = parse_source(&format!("f({arguments});"));

        let warnings: Vec<_> = result
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("more than 32"));

        let Stmt::Expr(expr) = &result.stmts[0] else {
            panic!("expected the call to parse");
        };
        let ExprKind::Call { arguments, .. } = &expr.kind else {
            panic!("expected a call");
        };
        assert_eq!(arguments.len(), 33);
    }

    #[test]
    fn expression_ids_are_unique_and_continue_across_parses() {
        let first = parse_source("1 + 2;");
        let lexed = lex("3 * 4;");
        let second = parse_from(lexed.tokens, true, first.next_id);
        assert!(second.next_id.0 > first.next_id.0);
    }

    #[test]
    fn non_repl_mode_rejects_bare_statements() {
        let result = parse(lex("1 + 2;").tokens, false);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.message.contains("expecting a declaration"))
        );
    }
}
