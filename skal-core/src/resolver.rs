//! Lexical scope resolution.
//!
//! A single pre-order pass over the AST that computes, for every
//! variable and `this` reference, how many scope hops separate the
//! reference from its declaring scope. The evaluator uses those
//! distances to jump straight to the right environment frame instead of
//! walking the chain. Unlike the parser, this pass stops at its first
//! error: everything after it assumes a well-formed input.

use std::collections::HashMap;

use crate::ast::{Expr, ExprId, ExprKind, Parameter, Stmt};
use crate::error::ResolveError;
use crate::token::Token;

/// Binding distances keyed by expression identity.
///
/// Populated only here; consumed by evaluation. Names found in no
/// lexical scope are deliberately absent: the evaluator falls back to
/// walking the environment chain for them (session globals from earlier
/// REPL lines, builtins).
pub type Locals = HashMap<ExprId, usize>;

pub struct Resolver<'a> {
    scopes: Vec<HashMap<String, bool>>,
    locals: &'a mut Locals,
}

impl<'a> Resolver<'a> {
    pub fn new(locals: &'a mut Locals) -> Resolver<'a> {
        Resolver {
            scopes: Vec::new(),
            locals,
        }
    }

    pub fn resolve(&mut self, stmts: &[Stmt]) -> Result<(), ResolveError> {
        self.begin_scope();
        let result = self.resolve_stmts(stmts);
        self.end_scope();

        result
    }

    fn resolve_stmts(&mut self, stmts: &[Stmt]) -> Result<(), ResolveError> {
        for stmt in stmts {
            self.resolve_stmt(stmt)?;
        }

        Ok(())
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) -> Result<(), ResolveError> {
        match stmt {
            Stmt::Expr(expr) => self.resolve_expr(expr),
            Stmt::Block(body) => {
                self.begin_scope();
                let result = self.resolve_stmts(body);
                self.end_scope();
                result
            }
            // the body runs in a child environment, so it gets a scope
            // of its own; the condition is evaluated outside it
            Stmt::While { condition, body } => {
                self.resolve_expr(condition)?;
                self.begin_scope();
                let result = self.resolve_stmts(body);
                self.end_scope();
                result
            }
            Stmt::Return(expr) => self.resolve_expr(expr),
            // declare and define are split so that
            //   val x = "";
            //   {
            //     val x = x + ";";
            //   }
            // resolves the initializer's x to the enclosing binding
            Stmt::Val { name, value, .. } | Stmt::Var { name, value, .. } => {
                self.declare(name)?;
                self.resolve_expr(value)?;
                self.define(name)
            }
            Stmt::StructDef { name, .. } => {
                self.declare(name)?;
                self.define(name)
            }
            Stmt::Comment(_) => Ok(()),
        }
    }

    fn resolve_expr(&mut self, expr: &Expr) -> Result<(), ResolveError> {
        match &expr.kind {
            ExprKind::Assign { name, value } => {
                self.resolve_expr(value)?;
                self.resolve_local(expr.id, name);
                Ok(())
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)
            }
            ExprKind::Grouping { expr } => self.resolve_expr(expr),
            ExprKind::Literal { .. } => Ok(()),
            ExprKind::Unary { right, .. } => self.resolve_expr(right),
            ExprKind::Var { name } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        // the name is mid-declaration in this scope: a
                        // shadowed enclosing binding still resolves,
                        // a bare self-reference is an error
                        for (hops, scope) in self.scopes.iter().rev().enumerate().skip(1) {
                            if scope.contains_key(&name.lexeme) {
                                self.locals.insert(expr.id, hops);
                                return Ok(());
                            }
                        }
                        return Err(ResolveError::UninitializedVariable {
                            name: name.lexeme.clone(),
                            line: name.line,
                        });
                    }
                }
                self.resolve_local(expr.id, name);
                Ok(())
            }
            ExprKind::Get { receiver, .. } => self.resolve_expr(receiver),
            ExprKind::Set {
                receiver, value, ..
            } => {
                self.resolve_expr(receiver)?;
                self.resolve_expr(value)
            }
            ExprKind::Call { callee, arguments } => {
                self.resolve_expr(callee)?;
                for argument in arguments {
                    self.resolve_expr(&argument.value)?;
                }
                Ok(())
            }
            ExprKind::This { keyword } => {
                self.resolve_local(expr.id, keyword);
                Ok(())
            }
            // each branch runs in a child environment of its own
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.begin_scope();
                let result = self.resolve_stmts(then_branch);
                self.end_scope();
                result?;
                if let Some(else_branch) = else_branch {
                    self.begin_scope();
                    let result = self.resolve_stmts(else_branch);
                    self.end_scope();
                    result?;
                }
                Ok(())
            }
            // functions declare and define their own name in the
            // enclosing scope first, which is what permits recursion
            ExprKind::CommonFunc {
                name,
                parameters,
                body,
                ..
            } => {
                self.declare(name)?;
                self.define(name)?;
                self.resolve_function(parameters, body, false)
            }
            ExprKind::AnonymousFunc {
                parameters, body, ..
            } => self.resolve_function(parameters, body, false),
            ExprKind::ExtensionFunc {
                name,
                parameters,
                body,
                ..
            } => {
                self.declare(name)?;
                self.define(name)?;
                self.resolve_function(parameters, body, true)
            }
            ExprKind::NativeFunc { .. } => Ok(()),
        }
    }

    fn resolve_function(
        &mut self,
        parameters: &[Parameter],
        body: &[Stmt],
        with_this: bool,
    ) -> Result<(), ResolveError> {
        self.begin_scope();

        if with_this {
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert("this".to_string(), true);
            }
        }

        let result = parameters
            .iter()
            .try_for_each(|parameter| {
                self.declare(&parameter.name)?;
                self.define(&parameter.name)
            })
            .and_then(|_| self.resolve_stmts(body));

        self.end_scope();

        result
    }

    fn declare(&mut self, name: &Token) -> Result<(), ResolveError> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };

        if scope.contains_key(&name.lexeme) {
            return Err(ResolveError::AlreadyDeclared {
                name: name.lexeme.clone(),
                line: name.line,
            });
        }

        scope.insert(name.lexeme.clone(), false);
        Ok(())
    }

    fn define(&mut self, name: &Token) -> Result<(), ResolveError> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };

        match scope.get_mut(&name.lexeme) {
            Some(defined) => {
                *defined = true;
                Ok(())
            }
            None => Err(ResolveError::UnresolvedVariable {
                name: name.lexeme.clone(),
                line: name.line,
            }),
        }
    }

    /// Record how many scopes up the declaring scope sits: 0 for the
    /// current scope, 1 for the enclosing one, and so on. Scans
    /// innermost-first and stops at the first hit so shadowing binds to
    /// the nearest declaration.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (hops, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(&name.lexeme) {
                self.locals.insert(id, hops);
                return;
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }
}
