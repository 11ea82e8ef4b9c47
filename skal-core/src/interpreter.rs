//! Tree-walking evaluator.
//!
//! Runs the resolved (but not type-checked) AST against a live
//! [`Env`] chain, using the resolver's distances to jump straight to
//! the declaring frame. `return` is modeled as an explicit unwind
//! signal in the error channel ([`Unwind::Return`]) and caught at the
//! nearest call boundary, never as a panic.
//!
//! Logical `and`/`or` evaluate both operands before combining. That
//! matches the language this implements, not the usual short-circuit
//! convention; see DESIGN.md before "fixing" it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Expr, ExprKind, Stmt};
use crate::environment::Env;
use crate::error::RuntimeError;
use crate::resolver::Locals;
use crate::token::{Literal, Token, TokenKind};
use crate::value::{FunctionValue, InstanceValue, StructValue, Value};

/// Non-local control transfer threaded through evaluation.
#[derive(Debug)]
pub enum Unwind {
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Unwind {
        Unwind::Error(error)
    }
}

type Evaluated<T> = Result<T, Unwind>;

pub struct Evaluator<'a> {
    locals: &'a Locals,
}

impl<'a> Evaluator<'a> {
    pub fn new(locals: &'a Locals) -> Evaluator<'a> {
        Evaluator { locals }
    }

    /// Evaluate a top-level unit; the result is the last statement's
    /// value.
    pub fn eval_stmts(&self, stmts: &[Stmt], env: &Env) -> Result<Value, RuntimeError> {
        let mut last = Value::Unit;

        for stmt in stmts {
            last = match self.exec(stmt, env) {
                Ok(value) => value,
                // the parser rejects return outside a function, so a
                // stray unwind here is an internal inconsistency
                Err(Unwind::Return(_)) => {
                    return Err(RuntimeError::TypeMismatch(
                        "return outside of a function".to_string(),
                    ));
                }
                Err(Unwind::Error(error)) => return Err(error),
            };
        }

        Ok(last)
    }

    fn exec(&self, stmt: &Stmt, env: &Env) -> Evaluated<Value> {
        match stmt {
            Stmt::Expr(expr) => self.eval(expr, env),
            Stmt::Val { name, value, .. } => {
                let value = self.eval(value, env)?;
                env.define(&name.lexeme, value, false)?;
                Ok(Value::Unit)
            }
            Stmt::Var { name, value, .. } => {
                let value = self.eval(value, env)?;
                env.define(&name.lexeme, value, true)?;
                Ok(Value::Unit)
            }
            Stmt::StructDef { name, fields } => {
                let definition = StructValue {
                    name: name.lexeme.clone(),
                    fields: fields
                        .iter()
                        .map(|field| field.name.lexeme.clone())
                        .collect(),
                    functions: RefCell::new(HashMap::new()),
                };
                env.define(&name.lexeme, Value::Struct(Rc::new(definition)), false)?;
                Ok(Value::Unit)
            }
            Stmt::Block(body) => {
                let local = env.child();
                for stmt in body {
                    self.exec(stmt, &local)?;
                }
                Ok(Value::Unit)
            }
            Stmt::While { condition, body } => {
                while self.eval(condition, env)?.is_truthy()? {
                    let local = env.child();
                    for stmt in body {
                        self.exec(stmt, &local)?;
                    }
                }
                Ok(Value::Unit)
            }
            Stmt::Return(expr) => {
                let value = self.eval(expr, env)?;
                Err(Unwind::Return(value))
            }
            Stmt::Comment(_) => Ok(Value::Unit),
        }
    }

    fn eval(&self, expr: &Expr, env: &Env) -> Evaluated<Value> {
        match &expr.kind {
            ExprKind::Literal { value } => Ok(literal_value(value)),
            ExprKind::Grouping { expr } => self.eval(expr, env),
            ExprKind::Var { name } => Ok(self.lookup(name, expr, env)?),
            ExprKind::This { keyword } => Ok(self.lookup(keyword, expr, env)?),
            ExprKind::Assign { name, value } => {
                let value = self.eval(value, env)?;
                match self.locals.get(&expr.id) {
                    Some(distance) => env.assign_at(*distance, &name.lexeme, value.clone())?,
                    None => env.assign(&name.lexeme, value.clone())?,
                }
                Ok(value)
            }
            ExprKind::Unary { op, right } => {
                let right = self.eval(right, env)?;
                Ok(self.unary(op, right)?)
            }
            ExprKind::Binary { left, op, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                Ok(self.binary(op, left, right)?)
            }
            // both operands are evaluated before combining
            ExprKind::Logical { left, op, right } => {
                let left = self.eval(left, env)?.is_truthy()?;
                let right = self.eval(right, env)?.is_truthy()?;
                match op.kind {
                    TokenKind::Or => Ok(Value::Bool(left || right)),
                    TokenKind::And => Ok(Value::Bool(left && right)),
                    _ => Err(illegal(op, "not a logical operator").into()),
                }
            }
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.eval(condition, env)?.is_truthy()?;
                let local = env.child();
                if condition {
                    self.eval_branch(then_branch, &local)
                } else if let Some(else_branch) = else_branch {
                    self.eval_branch(else_branch, &local)
                } else {
                    Ok(Value::Unit)
                }
            }
            ExprKind::Get { receiver, name } => {
                let receiver = self.eval(receiver, env)?;
                match &receiver {
                    Value::Instance(instance) => {
                        if let Some(value) = instance.fields.borrow().get(&name.lexeme).cloned()
                        {
                            return Ok(value);
                        }
                        let method = instance
                            .definition
                            .functions
                            .borrow()
                            .get(&name.lexeme)
                            .cloned();
                        match method {
                            Some(func) => {
                                Ok(Value::Function(Rc::new(func.bind(receiver.clone()))))
                            }
                            None => Err(RuntimeError::UnresolvedField {
                                field: name.lexeme.clone(),
                                receiver: receiver.type_name(),
                            }
                            .into()),
                        }
                    }
                    _ => Err(RuntimeError::TypeMismatch(format!(
                        "can't get fields from non-instances: {receiver}"
                    ))
                    .into()),
                }
            }
            ExprKind::Set {
                receiver,
                name,
                value,
            } => {
                let receiver = self.eval(receiver, env)?;
                match &receiver {
                    Value::Instance(instance) => {
                        let value = self.eval(value, env)?;
                        instance
                            .fields
                            .borrow_mut()
                            .insert(name.lexeme.clone(), value);
                        Ok(Value::Unit)
                    }
                    _ => Err(RuntimeError::TypeMismatch(
                        "can't set fields on non-instances".to_string(),
                    )
                    .into()),
                }
            }
            ExprKind::Call { callee, arguments } => {
                let callee = self.eval(callee, env)?;
                let mut evaluated = Vec::new();
                for argument in arguments {
                    let name = argument.name.as_ref().map(|token| token.lexeme.clone());
                    let value = self.eval(&argument.value, env)?;
                    evaluated.push((name, value));
                }

                match callee {
                    Value::Function(func) => self.call_function(&func, evaluated),
                    Value::Native(native) => {
                        if evaluated.len() != native.arity {
                            return Err(RuntimeError::ArityMismatch {
                                name: native.name.clone(),
                                expected: native.arity,
                                given: evaluated.len(),
                            }
                            .into());
                        }
                        let values: Vec<Value> =
                            evaluated.into_iter().map(|(_, value)| value).collect();
                        Ok((native.call)(&values)?)
                    }
                    Value::Struct(definition) => Ok(self.construct(&definition, evaluated)?),
                    other => Err(RuntimeError::TypeMismatch(format!(
                        "can't call a non-callable value: {other}"
                    ))
                    .into()),
                }
            }
            ExprKind::CommonFunc {
                name,
                parameters,
                body,
                ..
            } => {
                let func = Rc::new(FunctionValue {
                    name: Some(name.lexeme.clone()),
                    parameters: parameters.clone(),
                    body: Rc::new(body.clone()),
                    closure: env.clone(),
                    receiver: None,
                });
                env.define(&name.lexeme, Value::Function(func.clone()), false)?;
                Ok(Value::Function(func))
            }
            ExprKind::AnonymousFunc {
                parameters, body, ..
            } => Ok(Value::Function(Rc::new(FunctionValue {
                name: None,
                parameters: parameters.clone(),
                body: Rc::new(body.clone()),
                closure: env.clone(),
                receiver: None,
            }))),
            ExprKind::ExtensionFunc {
                receiver,
                name,
                parameters,
                body,
                ..
            } => {
                let target = env.get(&receiver.lexeme)?;
                let Value::Struct(definition) = &target else {
                    return Err(RuntimeError::TypeMismatch(format!(
                        "expected a struct type but got {}",
                        target.type_name()
                    ))
                    .into());
                };
                let func = FunctionValue {
                    name: Some(name.lexeme.clone()),
                    parameters: parameters.clone(),
                    body: Rc::new(body.clone()),
                    closure: env.clone(),
                    receiver: None,
                };
                definition
                    .functions
                    .borrow_mut()
                    .insert(name.lexeme.clone(), Rc::new(func));
                Ok(Value::Unit)
            }
            // the environment already carries the native; the
            // declaration only exists for tooling
            ExprKind::NativeFunc { .. } => Ok(Value::Unit),
        }
    }

    fn eval_branch(&self, stmts: &[Stmt], env: &Env) -> Evaluated<Value> {
        let mut last = Value::Unit;
        for stmt in stmts {
            last = self.exec(stmt, env)?;
        }
        Ok(last)
    }

    fn call_function(
        &self,
        func: &Rc<FunctionValue>,
        arguments: Vec<(Option<String>, Value)>,
    ) -> Evaluated<Value> {
        if arguments.len() != func.parameters.len() {
            return Err(RuntimeError::ArityMismatch {
                name: func.display_name().to_string(),
                expected: func.parameters.len(),
                given: arguments.len(),
            }
            .into());
        }

        let local = func.closure.child();
        if let Some(receiver) = &func.receiver {
            local.define("this", receiver.clone(), false)?;
        }

        // named arguments bind their parameter, positional ones fill
        // the remaining slots in order
        let mut slots: Vec<Option<Value>> = vec![None; func.parameters.len()];
        for (name, value) in arguments {
            let slot = match name {
                Some(name) => func
                    .parameters
                    .iter()
                    .position(|parameter| parameter.name.lexeme == name)
                    .ok_or_else(|| {
                        RuntimeError::TypeMismatch(format!(
                            "unknown parameter {name} for {}",
                            func.display_name()
                        ))
                    })?,
                None => slots.iter().position(Option::is_none).ok_or_else(|| {
                    RuntimeError::TypeMismatch(format!(
                        "duplicate arguments for {}",
                        func.display_name()
                    ))
                })?,
            };
            slots[slot] = Some(value);
        }
        for (parameter, slot) in func.parameters.iter().zip(slots) {
            let value = slot.ok_or_else(|| {
                RuntimeError::TypeMismatch(format!(
                    "missing argument {} for {}",
                    parameter.name.lexeme,
                    func.display_name()
                ))
            })?;
            local.define(&parameter.name.lexeme, value, false)?;
        }

        for stmt in func.body.iter() {
            match self.exec(stmt, &local) {
                Ok(_) => {}
                Err(Unwind::Return(value)) => return Ok(value),
                Err(error) => return Err(error),
            }
        }

        Ok(Value::Unit)
    }

    fn construct(
        &self,
        definition: &Rc<StructValue>,
        arguments: Vec<(Option<String>, Value)>,
    ) -> Result<Value, RuntimeError> {
        if arguments.len() != definition.fields.len() {
            return Err(RuntimeError::ArityMismatch {
                name: definition.name.clone(),
                expected: definition.fields.len(),
                given: arguments.len(),
            });
        }

        let mut fields: HashMap<String, Value> = HashMap::new();
        let mut positional = Vec::new();
        for (name, value) in arguments {
            match name {
                Some(name) => {
                    if !definition.fields.contains(&name) {
                        return Err(RuntimeError::UnresolvedField {
                            field: name,
                            receiver: definition.name.clone(),
                        });
                    }
                    fields.insert(name, value);
                }
                None => positional.push(value),
            }
        }
        let mut positional = positional.into_iter();
        for field in &definition.fields {
            if !fields.contains_key(field) {
                if let Some(value) = positional.next() {
                    fields.insert(field.clone(), value);
                }
            }
        }

        Ok(Value::Instance(Rc::new(InstanceValue {
            definition: definition.clone(),
            fields: RefCell::new(fields),
        })))
    }

    fn lookup(&self, name: &Token, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match self.locals.get(&expr.id) {
            Some(distance) => env.get_at(*distance, &name.lexeme),
            None => env.get(&name.lexeme),
        }
    }

    fn unary(&self, op: &Token, right: Value) -> Result<Value, RuntimeError> {
        match op.kind {
            TokenKind::Minus => match right {
                Value::Int(value) => Ok(Value::Int(value.wrapping_neg())),
                Value::Double(value) => Ok(Value::Double(-value)),
                other => Err(illegal(op, format!("cannot negate {other}"))),
            },
            TokenKind::Plus => match right {
                Value::Int(_) | Value::Double(_) => Ok(right),
                other => Err(illegal(op, format!("cannot apply unary plus to {other}"))),
            },
            TokenKind::Bang => match right {
                Value::Bool(value) => Ok(Value::Bool(!value)),
                other => Err(illegal(op, format!("cannot invert {other}"))),
            },
            _ => Err(illegal(op, "not a unary operator")),
        }
    }

    fn binary(&self, op: &Token, left: Value, right: Value) -> Result<Value, RuntimeError> {
        if is_number_op(op.kind) && left.is_number() && right.is_number() {
            return numeric_op(op, &left, &right);
        }

        match op.kind {
            TokenKind::EqualEqual => Ok(Value::Bool(left == right)),
            TokenKind::BangEqual => Ok(Value::Bool(left != right)),
            // string concatenation stringifies the right operand
            TokenKind::Plus => match &left {
                Value::String(text) => Ok(Value::String(format!("{text}{right}"))),
                _ => Err(illegal(op, format!("cannot add {left} and {right}"))),
            },
            _ => Err(illegal(
                op,
                format!("cannot apply to {left} and {right}"),
            )),
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Int(value) => Value::Int(*value),
        Literal::Double(value) => Value::Double(*value),
        Literal::String(value) => Value::String(value.clone()),
        Literal::Bool(value) => Value::Bool(*value),
        Literal::Unit => Value::Unit,
    }
}

fn is_number_op(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual
    )
}

fn numeric_op(op: &Token, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(op, *a, *b),
        (Value::Int(a), Value::Double(b)) => double_op(op, *a as f64, *b),
        (Value::Double(a), Value::Int(b)) => double_op(op, *a, *b as f64),
        (Value::Double(a), Value::Double(b)) => double_op(op, *a, *b),
        _ => Err(illegal(op, format!("cannot apply to {left} and {right}"))),
    }
}

fn int_op(op: &Token, a: i64, b: i64) -> Result<Value, RuntimeError> {
    match op.kind {
        TokenKind::Plus => Ok(Value::Int(a.wrapping_add(b))),
        TokenKind::Minus => Ok(Value::Int(a.wrapping_sub(b))),
        TokenKind::Star => Ok(Value::Int(a.wrapping_mul(b))),
        TokenKind::Slash => {
            if b == 0 {
                return Err(illegal(op, "division by zero"));
            }
            Ok(Value::Int(a.wrapping_div(b)))
        }
        TokenKind::Greater => Ok(Value::Bool(a > b)),
        TokenKind::GreaterEqual => Ok(Value::Bool(a >= b)),
        TokenKind::Less => Ok(Value::Bool(a < b)),
        TokenKind::LessEqual => Ok(Value::Bool(a <= b)),
        _ => Err(illegal(op, "not a numeric operator")),
    }
}

fn double_op(op: &Token, a: f64, b: f64) -> Result<Value, RuntimeError> {
    match op.kind {
        TokenKind::Plus => Ok(Value::Double(a + b)),
        TokenKind::Minus => Ok(Value::Double(a - b)),
        TokenKind::Star => Ok(Value::Double(a * b)),
        TokenKind::Slash => Ok(Value::Double(a / b)),
        TokenKind::Greater => Ok(Value::Bool(a > b)),
        TokenKind::GreaterEqual => Ok(Value::Bool(a >= b)),
        TokenKind::Less => Ok(Value::Bool(a < b)),
        TokenKind::LessEqual => Ok(Value::Bool(a <= b)),
        _ => Err(illegal(op, "not a numeric operator")),
    }
}

fn illegal(op: &Token, detail: impl Into<String>) -> RuntimeError {
    RuntimeError::IllegalOperation {
        op: op.lexeme.clone(),
        detail: detail.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::resolver::{Locals, Resolver};

    fn eval_source(source: &str) -> Result<Value, RuntimeError> {
        let parsed = parse(lex(source).tokens, true);
        assert!(
            parsed.diagnostics.iter().all(|d| !d.is_error()),
            "unexpected diagnostics: {:?}",
            parsed.diagnostics
        );
        let mut locals = Locals::new();
        Resolver::new(&mut locals)
            .resolve(&parsed.stmts)
            .expect("resolution should succeed");
        let env = Env::global();
        Evaluator::new(&locals).eval_stmts(&parsed.stmts, &env)
    }

    #[test]
    fn precedence_evaluates_multiplication_first() {
        assert_eq!(eval_source("1 + 2 * 3;"), Ok(Value::Int(7)));
    }

    #[test]
    fn subtraction_associates_left() {
        assert_eq!(eval_source("10 - 3 - 2;"), Ok(Value::Int(5)));
    }

    #[test]
    fn string_concatenation_stringifies_the_right_operand() {
        assert_eq!(
            eval_source("\"a\" + 1;"),
            Ok(Value::String("a1".to_string()))
        );
    }

    #[test]
    fn adding_bool_and_int_is_an_illegal_operation() {
        let error = eval_source("true + 1;").unwrap_err();
        assert!(matches!(
            error,
            RuntimeError::IllegalOperation { op, .. } if op == "+"
        ));
    }

    #[test]
    fn integer_division_by_zero_is_an_illegal_operation() {
        let error = eval_source("1 / 0;").unwrap_err();
        assert!(matches!(error, RuntimeError::IllegalOperation { .. }));
    }

    #[test]
    fn mixed_numerics_promote_to_double() {
        assert_eq!(eval_source("1 + 0.5;"), Ok(Value::Double(1.5)));
    }

    #[test]
    fn shadowing_initializer_reads_the_outer_binding() {
        let result = eval_source(
            "val x = \"a\"; var seen = \"\"; { val x = x + \"b\"; seen = x; } seen;",
        );
        assert_eq!(result, Ok(Value::String("ab".to_string())));
    }

    #[test]
    fn val_bindings_reject_reassignment() {
        let error = eval_source("val x = 1; x = 2;").unwrap_err();
        assert_eq!(error, RuntimeError::AssignToImmutable("x".to_string()));
    }

    #[test]
    fn var_bindings_permit_reassignment() {
        assert_eq!(eval_source("var x = 1; x = 2; x;"), Ok(Value::Int(2)));
    }

    #[test]
    fn while_loop_runs_to_completion() {
        assert_eq!(
            eval_source("var i = 0; while i < 3 { i = i + 1; } i;"),
            Ok(Value::Int(3))
        );
    }

    #[test]
    fn if_expression_yields_the_branch_value() {
        assert_eq!(
            eval_source("val x = if 1 < 2 { \"yes\"; } else { \"no\"; }; x;"),
            Ok(Value::String("yes".to_string()))
        );
    }

    #[test]
    fn logical_operators_evaluate_both_operands() {
        // a short-circuiting `and` would leave hits at 0
        let result = eval_source(
            "var hits = 0; \
             func bump(): Bool { hits = hits + 1; return true; } \
             val r = false and bump(); \
             hits;",
        );
        assert_eq!(result, Ok(Value::Int(1)));
    }

    #[test]
    fn functions_return_through_the_unwind_signal() {
        assert_eq!(
            eval_source("func f(): Int { return 1; 99; } f();"),
            Ok(Value::Int(1))
        );
    }

    #[test]
    fn function_falls_off_the_end_with_unit() {
        assert_eq!(eval_source("func f() { 1; } f();"), Ok(Value::Unit));
    }

    #[test]
    fn closures_capture_their_defining_environment() {
        let result = eval_source(
            "var count = 0; \
             func bump(): Int { count = count + 1; return count; } \
             bump(); bump();",
        );
        assert_eq!(result, Ok(Value::Int(2)));
    }

    #[test]
    fn recursion_terminates() {
        let result = eval_source(
            "func fib(n: Int): Int { \
               val out = if n < 2 { n; } else { fib(n - 1) + fib(n - 2); }; \
               return out; \
             } \
             fib(10);",
        );
        assert_eq!(result, Ok(Value::Int(55)));
    }

    #[test]
    fn struct_construction_and_field_access() {
        assert_eq!(
            eval_source("typedef struct Point(x: Int, y: Int); val p = Point(1, 2); p.x;"),
            Ok(Value::Int(1))
        );
    }

    #[test]
    fn named_constructor_arguments_bind_by_name() {
        assert_eq!(
            eval_source("typedef struct Point(x: Int, y: Int); val p = Point(y: 2, x: 1); p.y;"),
            Ok(Value::Int(2))
        );
    }

    #[test]
    fn field_set_mutates_the_instance() {
        assert_eq!(
            eval_source(
                "typedef struct Point(x: Int, y: Int); val p = Point(1, 2); p.x = 5; p.x;"
            ),
            Ok(Value::Int(5))
        );
    }

    #[test]
    fn extension_function_binds_this() {
        let result = eval_source(
            "typedef struct Point(x: Int, y: Int); \
             func Point abscissa(): Int { return this.x; } \
             val p = Point(41, 0); \
             p.abscissa();",
        );
        assert_eq!(result, Ok(Value::Int(41)));
    }

    #[test]
    fn anonymous_functions_are_values() {
        assert_eq!(
            eval_source("val double = func (x: Int): Int = x * 2; double(21);"),
            Ok(Value::Int(42))
        );
    }

    #[test]
    fn calling_a_non_callable_fails() {
        let error = eval_source("1();").unwrap_err();
        assert!(matches!(error, RuntimeError::TypeMismatch(_)));
    }

    #[test]
    fn get_on_a_non_instance_fails() {
        let error = eval_source("val x = 1; x.y;").unwrap_err();
        assert!(matches!(error, RuntimeError::TypeMismatch(_)));
    }

    #[test]
    fn unknown_field_fails() {
        let error =
            eval_source("typedef struct P(x: Int); val p = P(1); p.z;").unwrap_err();
        assert!(matches!(error, RuntimeError::UnresolvedField { .. }));
    }

    #[test]
    fn arity_mismatch_names_the_function() {
        let error = eval_source("func f(a: Int): Int = a; f(1, 2);").unwrap_err();
        assert_eq!(
            error,
            RuntimeError::ArityMismatch {
                name: "f".to_string(),
                expected: 1,
                given: 2,
            }
        );
    }

    #[test]
    fn undefined_variable_fails() {
        let error = eval_source("missing;").unwrap_err();
        assert_eq!(error, RuntimeError::UndefinedVariable("missing".to_string()));
    }

    #[test]
    fn non_bool_condition_is_a_type_error() {
        let error = eval_source("if 1 { 2; }").unwrap_err();
        assert!(matches!(error, RuntimeError::TypeMismatch(_)));
    }
}
