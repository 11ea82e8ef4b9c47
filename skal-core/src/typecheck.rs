//! Type checking and descriptor emission.
//!
//! Walks the resolved AST with a stack of [`TypeContainer`]s, validates
//! every expression and statement against the active container, and
//! emits the type-annotated [`Descriptor`] tree. Stops at the first
//! error; the container stack is popped on error exits too, so a failed
//! unit never leaves a stale scope behind.

use std::rc::Rc;

use crate::ast::{CallArgument, Expr, ExprKind, Parameter, Stmt};
use crate::descriptor::Descriptor;
use crate::error::CompileError;
use crate::token::{Literal, Token, TokenKind};
use crate::types::{match_overload, ContainerStack, FunctionType, StructType, Type};

/// Type-check a unit and emit one descriptor per (non-comment)
/// top-level statement.
pub fn compile(
    stmts: &[Stmt],
    containers: &mut ContainerStack,
) -> Result<Vec<Descriptor>, CompileError> {
    let mut checker = TypeChecker { containers };
    let mut descriptors = Vec::new();

    for stmt in stmts {
        if matches!(stmt, Stmt::Comment(_)) {
            continue;
        }
        let (descriptor, _) = checker.check_stmt(stmt)?;
        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

struct TypeChecker<'a> {
    containers: &'a mut ContainerStack,
}

impl TypeChecker<'_> {
    /// The returned type is the statement's value when it closes a
    /// block: the expression's type for expression statements, Unit for
    /// everything else.
    fn check_stmt(&mut self, stmt: &Stmt) -> Result<(Descriptor, Type), CompileError> {
        match stmt {
            Stmt::Expr(expr) => self.check_expr(expr),
            Stmt::Block(body) => {
                let (body, _) = self.scoped(|checker| checker.check_block(body))?;
                Ok((Descriptor::Block { body }, Type::Unit))
            }
            Stmt::While { condition, body } => {
                let (condition, condition_ty) = self.check_expr(condition)?;
                self.require(&Type::Bool, &condition_ty)?;
                let (body, _) = self.scoped(|checker| checker.check_block(body))?;
                Ok((
                    Descriptor::While {
                        condition: Box::new(condition),
                        body,
                    },
                    Type::Unit,
                ))
            }
            Stmt::Return(expr) => {
                let (value, ty) = self.check_expr(expr)?;
                Ok((
                    Descriptor::Return {
                        value: Box::new(value),
                        ty: ty.clone(),
                    },
                    ty,
                ))
            }
            Stmt::Val { name, ty, value } => {
                let (value, ty) = self.check_binding(name, ty, value)?;
                Ok((
                    Descriptor::Val {
                        name: name.lexeme.clone(),
                        value: Box::new(value),
                        ty,
                    },
                    Type::Unit,
                ))
            }
            Stmt::Var { name, ty, value } => {
                let (value, ty) = self.check_binding(name, ty, value)?;
                Ok((
                    Descriptor::Var {
                        name: name.lexeme.clone(),
                        value: Box::new(value),
                        ty,
                    },
                    Type::Unit,
                ))
            }
            Stmt::StructDef { name, fields } => {
                let fields = self.typed_parameters(fields)?;
                let def = Rc::new(StructType {
                    name: name.lexeme.clone(),
                    fields: fields.clone(),
                });
                self.containers
                    .innermost()
                    .define_type(&name.lexeme, Type::Struct(def));
                Ok((
                    Descriptor::Class {
                        name: name.lexeme.clone(),
                        parameters: fields,
                    },
                    Type::Unit,
                ))
            }
            Stmt::Comment(_) => Ok((Descriptor::Block { body: Vec::new() }, Type::Unit)),
        }
    }

    fn check_expr(&mut self, expr: &Expr) -> Result<(Descriptor, Type), CompileError> {
        match &expr.kind {
            ExprKind::Literal { value } => {
                let ty = literal_type(value);
                Ok((
                    Descriptor::Const {
                        value: value.clone(),
                        ty: ty.clone(),
                    },
                    ty,
                ))
            }
            ExprKind::Grouping { expr } => self.check_expr(expr),
            ExprKind::Unary { op, right } => {
                let (right, right_ty) = self.check_expr(right)?;
                let ty = match op.kind {
                    TokenKind::Bang => {
                        self.require(&Type::Bool, &right_ty)?;
                        Type::Bool
                    }
                    _ => {
                        self.require_numeric(&right_ty)?;
                        right_ty
                    }
                };
                Ok((
                    Descriptor::Unary {
                        op: op.kind,
                        right: Box::new(right),
                        ty: ty.clone(),
                    },
                    ty,
                ))
            }
            ExprKind::Binary { left, op, right } => {
                let (left, left_ty) = self.check_expr(left)?;
                let (right, right_ty) = self.check_expr(right)?;
                let ty = self.binary_type(op, &left_ty, &right_ty)?;
                Ok((
                    Descriptor::Binary {
                        left: Box::new(left),
                        op: op.kind,
                        right: Box::new(right),
                        ty: ty.clone(),
                    },
                    ty,
                ))
            }
            ExprKind::Logical { left, op, right } => {
                let (left, left_ty) = self.check_expr(left)?;
                let (right, right_ty) = self.check_expr(right)?;
                self.require(&Type::Bool, &left_ty)?;
                self.require(&Type::Bool, &right_ty)?;
                Ok((
                    Descriptor::Logical {
                        left: Box::new(left),
                        op: op.kind,
                        right: Box::new(right),
                        ty: Type::Bool,
                    },
                    Type::Bool,
                ))
            }
            ExprKind::Var { name } => {
                let ty = self.variable_type(name)?;
                Ok((
                    Descriptor::GlobalVar {
                        name: name.lexeme.clone(),
                        ty: ty.clone(),
                    },
                    ty,
                ))
            }
            ExprKind::Assign { name, value } => {
                let declared = self.containers.lookup(&name.lexeme)?;
                let (value, value_ty) = self.check_expr(value)?;
                if !declared.is_assignable_by(&value_ty) {
                    return Err(CompileError::UnexpectedType {
                        expected: declared.to_string(),
                        found: value_ty.to_string(),
                    });
                }
                Ok((
                    Descriptor::Assign {
                        name: name.lexeme.clone(),
                        value: Box::new(value),
                        ty: declared.clone(),
                    },
                    declared,
                ))
            }
            ExprKind::Get { receiver, name } => {
                let (receiver, receiver_ty) = self.check_expr(receiver)?;
                let ty = self.member_type(&receiver_ty, name)?;
                Ok((
                    Descriptor::Get {
                        receiver: Box::new(receiver),
                        name: name.lexeme.clone(),
                        ty: ty.clone(),
                    },
                    ty,
                ))
            }
            ExprKind::Set {
                receiver,
                name,
                value,
            } => {
                let (receiver, receiver_ty) = self.check_expr(receiver)?;
                let Type::Struct(def) = &receiver_ty else {
                    return Err(CompileError::UnexpectedType {
                        expected: "a struct type".to_string(),
                        found: receiver_ty.to_string(),
                    });
                };
                let field_ty = def.field(&name.lexeme).cloned().ok_or_else(|| {
                    CompileError::UnresolvedField {
                        field: name.lexeme.clone(),
                        ty: receiver_ty.to_string(),
                    }
                })?;
                let (value, value_ty) = self.check_expr(value)?;
                if !field_ty.is_assignable_by(&value_ty) {
                    return Err(CompileError::UnexpectedType {
                        expected: field_ty.to_string(),
                        found: value_ty.to_string(),
                    });
                }
                Ok((
                    Descriptor::Set {
                        receiver: Box::new(receiver),
                        name: name.lexeme.clone(),
                        value: Box::new(value),
                    },
                    Type::Unit,
                ))
            }
            ExprKind::This { .. } => {
                let ty = self.containers.lookup("this")?;
                Ok((Descriptor::This { ty: ty.clone() }, ty))
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.check_if(condition, then_branch, else_branch.as_deref()),
            ExprKind::Call { callee, arguments } => self.check_call(callee, arguments),
            ExprKind::CommonFunc {
                name,
                parameters,
                return_type,
                body,
            } => {
                let explicit = self.typed_parameters(parameters)?;
                let declared = self.typed_return(return_type)?;
                let func = Rc::new(FunctionType {
                    parameters: explicit.clone(),
                    return_type: declared.clone(),
                    receiver: None,
                });
                // registered before the body so recursion resolves
                self.containers
                    .innermost()
                    .define_function(&name.lexeme, func.clone());

                let (body, returned) = self.check_function_body(&explicit, None, body)?;
                self.validate_return(&name.lexeme, &declared, returned)?;

                Ok((
                    Descriptor::Function {
                        name: name.lexeme.clone(),
                        parameters: explicit,
                        return_type: declared,
                        body,
                    },
                    Type::Function(func),
                ))
            }
            ExprKind::AnonymousFunc {
                parameters,
                return_type,
                body,
            } => {
                let explicit = self.typed_parameters(parameters)?;
                let declared = self.typed_return(return_type)?;
                let func = Rc::new(FunctionType {
                    parameters: explicit.clone(),
                    return_type: declared.clone(),
                    receiver: None,
                });

                let (body, returned) = self.check_function_body(&explicit, None, body)?;
                self.validate_return("anonymous function", &declared, returned)?;

                Ok((
                    Descriptor::LocalFunction {
                        parameters: explicit,
                        return_type: declared,
                        body,
                    },
                    Type::Function(func),
                ))
            }
            ExprKind::ExtensionFunc {
                receiver,
                name,
                parameters,
                return_type,
                body,
            } => {
                let receiver_ty = self.containers.find_type(&receiver.lexeme)?;
                let explicit = self.typed_parameters(parameters)?;
                let declared = self.typed_return(return_type)?;
                let func = Rc::new(FunctionType {
                    parameters: explicit.clone(),
                    return_type: declared.clone(),
                    receiver: Some(receiver_ty.clone()),
                });
                self.containers
                    .innermost()
                    .define_function(&name.lexeme, func.clone());

                let (body, returned) =
                    self.check_function_body(&explicit, Some(&receiver_ty), body)?;
                self.validate_return(&name.lexeme, &declared, returned)?;

                // the implicit this parameter is prepended to the
                // explicit list in the emitted descriptor
                let mut parameters = vec![("this".to_string(), receiver_ty)];
                parameters.extend(explicit);

                Ok((
                    Descriptor::Function {
                        name: name.lexeme.clone(),
                        parameters,
                        return_type: declared,
                        body,
                    },
                    Type::Function(func),
                ))
            }
            ExprKind::NativeFunc {
                name,
                parameters,
                return_type,
            } => {
                let explicit = self.typed_parameters(parameters)?;
                let declared = self.typed_return(return_type)?;
                let func = Rc::new(FunctionType {
                    parameters: explicit.clone(),
                    return_type: declared.clone(),
                    receiver: None,
                });
                self.containers
                    .innermost()
                    .define_function(&name.lexeme, func.clone());

                Ok((
                    Descriptor::NativeFunction {
                        name: name.lexeme.clone(),
                        parameters: explicit,
                        return_type: declared,
                        native_call: name.lexeme.clone(),
                    },
                    Type::Function(func),
                ))
            }
        }
    }

    fn check_if(
        &mut self,
        condition: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
    ) -> Result<(Descriptor, Type), CompileError> {
        let (condition, condition_ty) = self.check_expr(condition)?;
        self.require(&Type::Bool, &condition_ty)?;

        let (then_branch, then_ty) = self.scoped(|checker| checker.check_block(then_branch))?;

        match else_branch {
            Some(else_stmts) => {
                let (else_branch, else_ty) =
                    self.scoped(|checker| checker.check_block(else_stmts))?;
                if then_ty != else_ty {
                    return Err(CompileError::UnexpectedType {
                        expected: then_ty.to_string(),
                        found: else_ty.to_string(),
                    });
                }
                Ok((
                    Descriptor::If {
                        condition: Box::new(condition),
                        then_branch,
                        else_branch,
                        ty: then_ty.clone(),
                    },
                    then_ty,
                ))
            }
            None => Ok((
                Descriptor::If {
                    condition: Box::new(condition),
                    then_branch,
                    else_branch: Vec::new(),
                    ty: Type::Unit,
                },
                Type::Unit,
            )),
        }
    }

    fn check_call(
        &mut self,
        callee: &Expr,
        arguments: &[CallArgument],
    ) -> Result<(Descriptor, Type), CompileError> {
        let mut checked = Vec::new();
        for argument in arguments {
            let (descriptor, ty) = self.check_expr(&argument.value)?;
            let name = argument.name.as_ref().map(|token| token.lexeme.clone());
            checked.push((name, descriptor, ty));
        }
        let argument_types: Vec<Type> = checked.iter().map(|(_, _, ty)| ty.clone()).collect();

        // a bare name resolves against the overload set first
        if let ExprKind::Var { name } = &callee.kind {
            let overloads = self.containers.lookup_function_overloads(&name.lexeme);
            if !overloads.is_empty() {
                let func = match_overload(&overloads, &argument_types, None)
                    .ok_or_else(|| CompileError::NoMatchingOverload {
                        name: name.lexeme.clone(),
                        arguments: join_types(&argument_types),
                    })?
                    .clone();
                let callee = Descriptor::GlobalVar {
                    name: name.lexeme.clone(),
                    ty: Type::Function(func.clone()),
                };
                return Ok((
                    Descriptor::Call {
                        callee: Box::new(callee),
                        arguments: name_arguments(&func.parameters, checked),
                        ty: func.return_type.clone(),
                    },
                    func.return_type.clone(),
                ));
            }
        }

        // otherwise the callee must evaluate to a function type
        let (callee, callee_ty) = self.check_expr(callee)?;
        let Type::Function(func) = callee_ty else {
            return Err(CompileError::UnexpectedType {
                expected: "a callable type".to_string(),
                found: callee_ty.to_string(),
            });
        };

        if func.parameters.len() != argument_types.len() {
            return Err(CompileError::UnexpectedType {
                expected: format!("{} argument(s)", func.parameters.len()),
                found: format!("{} argument(s)", argument_types.len()),
            });
        }
        for ((_, parameter), argument) in func.parameters.iter().zip(&argument_types) {
            if !parameter.is_assignable_by(argument) {
                return Err(CompileError::UnexpectedType {
                    expected: parameter.to_string(),
                    found: argument.to_string(),
                });
            }
        }

        Ok((
            Descriptor::Call {
                callee: Box::new(callee),
                arguments: name_arguments(&func.parameters, checked),
                ty: func.return_type.clone(),
            },
            func.return_type.clone(),
        ))
    }

    fn check_binding(
        &mut self,
        name: &Token,
        annotation: &Option<Token>,
        value: &Expr,
    ) -> Result<(Descriptor, Type), CompileError> {
        let (value, actual) = self.check_expr(value)?;

        let ty = match annotation {
            Some(token) => {
                let declared = self.containers.find_type(&token.lexeme)?;
                if !declared.is_assignable_by(&actual) {
                    return Err(CompileError::UnexpectedType {
                        expected: declared.to_string(),
                        found: actual.to_string(),
                    });
                }
                declared
            }
            None => actual,
        };

        self.containers.innermost().define(&name.lexeme, ty.clone());

        Ok((value, ty))
    }

    /// Check a block's statements in the current scope; the type is the
    /// last statement's when it is an expression statement, Unit
    /// otherwise.
    fn check_block(&mut self, stmts: &[Stmt]) -> Result<(Vec<Descriptor>, Type), CompileError> {
        let mut descriptors = Vec::new();
        let mut last_ty = Type::Unit;

        for stmt in stmts {
            if matches!(stmt, Stmt::Comment(_)) {
                continue;
            }
            let (descriptor, ty) = self.check_stmt(stmt)?;
            last_ty = if matches!(stmt, Stmt::Expr(_)) {
                ty
            } else {
                Type::Unit
            };
            descriptors.push(descriptor);
        }

        Ok((descriptors, last_ty))
    }

    /// Check a function body in a fresh scope seeded with `this` (when
    /// present) and the parameters. Also reports the type of the first
    /// top-level return statement, which return validation consumes.
    fn check_function_body(
        &mut self,
        parameters: &[(String, Type)],
        receiver: Option<&Type>,
        body: &[Stmt],
    ) -> Result<(Vec<Descriptor>, Option<Type>), CompileError> {
        self.scoped(|checker| {
            if let Some(receiver_ty) = receiver {
                checker
                    .containers
                    .innermost()
                    .define("this", receiver_ty.clone());
            }
            for (name, ty) in parameters {
                checker.containers.innermost().define(name, ty.clone());
            }

            let mut descriptors = Vec::new();
            let mut returned = None;
            for stmt in body {
                if matches!(stmt, Stmt::Comment(_)) {
                    continue;
                }
                let (descriptor, ty) = checker.check_stmt(stmt)?;
                if returned.is_none() && matches!(stmt, Stmt::Return(_)) {
                    returned = Some(ty);
                }
                descriptors.push(descriptor);
            }

            Ok((descriptors, returned))
        })
    }

    fn validate_return(
        &mut self,
        name: &str,
        declared: &Type,
        returned: Option<Type>,
    ) -> Result<(), CompileError> {
        if *declared == Type::Unit {
            return Ok(());
        }

        match returned {
            None => Err(CompileError::MissingReturn(name.to_string())),
            Some(ty) if ty != *declared => Err(CompileError::UnexpectedType {
                expected: declared.to_string(),
                found: ty.to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn binary_type(
        &mut self,
        op: &Token,
        left: &Type,
        right: &Type,
    ) -> Result<Type, CompileError> {
        match op.kind {
            // string concatenation stringifies any right operand
            TokenKind::Plus if *left == Type::String => Ok(Type::String),
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star | TokenKind::Slash => {
                self.require_numeric(left)?;
                self.require(left, right)?;
                Ok(left.clone())
            }
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => {
                self.require_numeric(left)?;
                self.require(left, right)?;
                Ok(Type::Bool)
            }
            TokenKind::EqualEqual | TokenKind::BangEqual => Ok(Type::Bool),
            _ => Err(CompileError::UnexpectedType {
                expected: "a binary operator".to_string(),
                found: op.lexeme.clone(),
            }),
        }
    }

    fn variable_type(&mut self, name: &Token) -> Result<Type, CompileError> {
        match self.containers.lookup(&name.lexeme) {
            Ok(ty) => Ok(ty),
            Err(error) => {
                // a function referenced as a value, when unambiguous
                let overloads = self.containers.lookup_function_overloads(&name.lexeme);
                match overloads.as_slice() {
                    [only] => Ok(Type::Function(only.clone())),
                    _ => Err(error),
                }
            }
        }
    }

    fn member_type(&mut self, receiver: &Type, name: &Token) -> Result<Type, CompileError> {
        let Type::Struct(def) = receiver else {
            return Err(CompileError::UnexpectedType {
                expected: "a struct type".to_string(),
                found: receiver.to_string(),
            });
        };

        if let Some(field_ty) = def.field(&name.lexeme) {
            return Ok(field_ty.clone());
        }

        // extension functions reached through an instance
        let overloads = self.containers.lookup_function_overloads(&name.lexeme);
        overloads
            .iter()
            .find(|func| func.receiver.as_ref() == Some(receiver))
            .map(|func| Type::Function(func.clone()))
            .ok_or_else(|| CompileError::UnresolvedField {
                field: name.lexeme.clone(),
                ty: receiver.to_string(),
            })
    }

    fn typed_parameters(
        &mut self,
        parameters: &[Parameter],
    ) -> Result<Vec<(String, Type)>, CompileError> {
        parameters
            .iter()
            .map(|parameter| {
                let ty = self.containers.find_type(&parameter.ty.lexeme)?;
                Ok((parameter.name.lexeme.clone(), ty))
            })
            .collect()
    }

    fn typed_return(&mut self, return_type: &Option<Token>) -> Result<Type, CompileError> {
        match return_type {
            Some(token) => self.containers.find_type(&token.lexeme),
            None => Ok(Type::Unit),
        }
    }

    fn require(&mut self, expected: &Type, found: &Type) -> Result<(), CompileError> {
        if expected.is_assignable_by(found) {
            Ok(())
        } else {
            Err(CompileError::UnexpectedType {
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    fn require_numeric(&mut self, found: &Type) -> Result<(), CompileError> {
        if found.is_numeric() {
            Ok(())
        } else {
            Err(CompileError::UnexpectedType {
                expected: "a numeric type".to_string(),
                found: found.to_string(),
            })
        }
    }

    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        self.containers.push();
        let result = f(self);
        self.containers.pop();

        result
    }
}

fn literal_type(value: &Literal) -> Type {
    match value {
        Literal::Int(_) => Type::Int,
        Literal::Double(_) => Type::Double,
        Literal::String(_) => Type::String,
        Literal::Bool(_) => Type::Bool,
        Literal::Unit => Type::Unit,
    }
}

/// Pair argument descriptors with names: an explicitly named argument
/// keeps its name, positional ones take the parameter's.
fn name_arguments(
    parameters: &[(String, Type)],
    arguments: Vec<(Option<String>, Descriptor, Type)>,
) -> Vec<(String, Descriptor)> {
    arguments
        .into_iter()
        .enumerate()
        .map(|(index, (name, descriptor, _))| {
            let name = name.unwrap_or_else(|| {
                parameters
                    .get(index)
                    .map(|(parameter, _)| parameter.clone())
                    .unwrap_or_else(|| index.to_string())
            });
            (name, descriptor)
        })
        .collect()
}

fn join_types(types: &[Type]) -> String {
    types
        .iter()
        .map(Type::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn compile_source(source: &str) -> Result<Vec<Descriptor>, CompileError> {
        let result = parse(lex(source).tokens, true);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:?}",
            result.diagnostics
        );
        let mut containers = ContainerStack::new();
        compile(&result.stmts, &mut containers)
    }

    #[test]
    fn literals_are_typed_structurally() {
        let descriptors = compile_source("1; 1.5; \"a\"; true;").expect("compile");
        let types: Vec<Type> = descriptors
            .iter()
            .map(|d| match d {
                Descriptor::Const { ty, .. } => ty.clone(),
                other => panic!("expected a const descriptor, got {other:?}"),
            })
            .collect();
        assert_eq!(
            types,
            vec![Type::Int, Type::Double, Type::String, Type::Bool]
        );
    }

    #[test]
    fn declared_type_mismatch_names_both_types() {
        let error = compile_source("val x: Int = \"hello\";").unwrap_err();
        assert_eq!(
            error,
            CompileError::UnexpectedType {
                expected: "Int".to_string(),
                found: "String".to_string(),
            }
        );
    }

    #[test]
    fn annotation_matching_the_initializer_passes() {
        let descriptors = compile_source("val x: Int = 10; x;").expect("compile");
        assert!(matches!(
            &descriptors[1],
            Descriptor::GlobalVar { ty: Type::Int, .. }
        ));
    }

    #[test]
    fn missing_return_in_non_unit_function_fails() {
        let error = compile_source("func f(): Int { val x = 1; }").unwrap_err();
        assert_eq!(error, CompileError::MissingReturn("f".to_string()));
    }

    #[test]
    fn return_type_mismatch_fails() {
        let error = compile_source("func f(): Int { return \"a\"; }").unwrap_err();
        assert!(matches!(error, CompileError::UnexpectedType { .. }));
    }

    #[test]
    fn unit_function_needs_no_return() {
        compile_source("func noop(name: String) { name; }").expect("compile");
    }

    #[test]
    fn if_expression_branches_must_agree() {
        let error = compile_source("val x = if true { 1; } else { \"a\"; };").unwrap_err();
        assert_eq!(
            error,
            CompileError::UnexpectedType {
                expected: "Int".to_string(),
                found: "String".to_string(),
            }
        );
    }

    #[test]
    fn if_statement_types_as_unit() {
        let descriptors = compile_source("if true { 1; }").expect("compile");
        assert!(matches!(
            &descriptors[0],
            Descriptor::If { ty: Type::Unit, .. }
        ));
    }

    #[test]
    fn unresolved_variable_carries_the_name() {
        let error = compile_source("missing;").unwrap_err();
        assert_eq!(error, CompileError::UnresolvedVar("missing".to_string()));
    }

    #[test]
    fn unresolved_type_annotation_fails() {
        let error = compile_source("val x: Missing = 1;").unwrap_err();
        assert_eq!(error, CompileError::UnresolvedType("Missing".to_string()));
    }

    #[test]
    fn calls_resolve_against_the_overload_set() {
        let descriptors =
            compile_source("func double(x: Int): Int = x * 2; double(21);").expect("compile");
        assert!(matches!(
            &descriptors[1],
            Descriptor::Call { ty: Type::Int, .. }
        ));
    }

    #[test]
    fn call_with_wrong_argument_type_reports_no_overload() {
        let error = compile_source("func double(x: Int): Int = x * 2; double(\"a\");").unwrap_err();
        assert!(matches!(
            error,
            CompileError::NoMatchingOverload { name, .. } if name == "double"
        ));
    }

    #[test]
    fn struct_constructor_and_field_access_type_check() {
        let descriptors = compile_source(
            "typedef struct Point(x: Int, y: Int); val p = Point(1, 2); p.x;",
        )
        .expect("compile");
        assert!(matches!(
            &descriptors[2],
            Descriptor::Get { ty: Type::Int, .. }
        ));
    }

    #[test]
    fn extension_function_synthesizes_this() {
        let descriptors = compile_source(
            "typedef struct Point(x: Int, y: Int); func Point abscissa(): Int = this.x;",
        )
        .expect("compile");
        let Descriptor::Function { parameters, .. } = &descriptors[1] else {
            panic!("expected a function descriptor");
        };
        assert_eq!(parameters[0].0, "this");
    }

    #[test]
    fn logical_operands_must_be_bool() {
        let error = compile_source("1 and 2;").unwrap_err();
        assert_eq!(
            error,
            CompileError::UnexpectedType {
                expected: "Bool".to_string(),
                found: "Int".to_string(),
            }
        );
    }

    #[test]
    fn while_condition_must_be_bool() {
        let error = compile_source("while 1 { }").unwrap_err();
        assert!(matches!(error, CompileError::UnexpectedType { .. }));
    }

    #[test]
    fn string_concatenation_accepts_any_right_operand() {
        let descriptors = compile_source("\"a\" + 1;").expect("compile");
        assert!(matches!(
            &descriptors[0],
            Descriptor::Binary { ty: Type::String, .. }
        ));
    }

    #[test]
    fn numeric_addition_with_bool_fails() {
        let error = compile_source("true + 1;").unwrap_err();
        assert_eq!(
            error,
            CompileError::UnexpectedType {
                expected: "a numeric type".to_string(),
                found: "Bool".to_string(),
            }
        );
    }

    #[test]
    fn failed_unit_leaves_the_container_stack_balanced() {
        let result = parse(lex("{ val x: Missing = 1; }").tokens, true);
        let mut containers = ContainerStack::new();
        compile(&result.stmts, &mut containers).unwrap_err();
        // a later unit still checks against the root scope
        let result = parse(lex("val y = 2;").tokens, true);
        compile(&result.stmts, &mut containers).expect("stack should be balanced");
    }
}
