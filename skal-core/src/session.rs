//! Session orchestration: the front-to-back pipeline plus the state a
//! REPL keeps between lines.
//!
//! A [`Session`] owns the global environment, the persistent binding
//! distances, the type container stack and the expression-id counter.
//! Parse diagnostics abort a unit before it touches any state; resolver,
//! type and runtime errors abort the unit but leave previously defined
//! bindings intact, so the caller can report and keep going.

use crate::ast::{ExprId, Stmt};
use crate::builtins;
use crate::bytecode::{self, Chunk};
use crate::descriptor::Descriptor;
use crate::environment::Env;
use crate::error::CoreError;
use crate::interpreter::Evaluator;
use crate::lexer::lex;
use crate::parser::parse_from;
use crate::resolver::{Locals, Resolver};
use crate::typecheck;
use crate::types::ContainerStack;
use crate::value::Value;

pub struct Session {
    globals: Env,
    locals: Locals,
    containers: ContainerStack,
    next_id: ExprId,
}

impl Session {
    pub fn new() -> Session {
        let globals = Env::global();
        let mut containers = ContainerStack::new();
        builtins::register_types(&mut containers);
        builtins::install(&globals);

        Session {
            globals,
            locals: Locals::new(),
            containers,
            next_id: ExprId(0),
        }
    }

    /// Evaluate one unit (a REPL line or a whole script); the result is
    /// the last statement's value.
    pub fn eval(&mut self, source: &str) -> Result<Value, CoreError> {
        let stmts = self.front_end(source)?;
        Resolver::new(&mut self.locals).resolve(&stmts)?;

        let evaluator = Evaluator::new(&self.locals);
        Ok(evaluator.eval_stmts(&stmts, &self.globals)?)
    }

    /// Type-check one unit and emit its descriptor tree.
    pub fn compile(&mut self, source: &str) -> Result<Vec<Descriptor>, CoreError> {
        let stmts = self.front_end(source)?;
        Resolver::new(&mut self.locals).resolve(&stmts)?;

        Ok(typecheck::compile(&stmts, &mut self.containers)?)
    }

    /// Compile one unit with the bytecode backend.
    pub fn compile_chunk(&mut self, source: &str) -> Result<Chunk, CoreError> {
        let stmts = self.front_end(source)?;

        Ok(bytecode::compile_chunk(&stmts)?)
    }

    /// Parse one unit without running any later pass.
    pub fn parse(&mut self, source: &str) -> Result<Vec<Stmt>, CoreError> {
        self.front_end(source)
    }

    /// Lex and parse, threading the expression-id counter so binding
    /// distances recorded for earlier lines stay valid.
    fn front_end(&mut self, source: &str) -> Result<Vec<Stmt>, CoreError> {
        let lexed = lex(source);
        let mut diagnostics = lexed.diagnostics;

        let parsed = parse_from(lexed.tokens, true, self.next_id);
        self.next_id = parsed.next_id;
        diagnostics.extend(parsed.diagnostics);

        let errors: Vec<_> = diagnostics.into_iter().filter(|d| d.is_error()).collect();
        if !errors.is_empty() {
            return Err(CoreError::Parse(errors));
        }

        Ok(parsed.stmts)
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CompileError, ResolveError, RuntimeError};

    #[test]
    fn evaluates_expressions_across_lines() {
        let mut session = Session::new();
        session.eval("val x = 20;").expect("first line");
        assert_eq!(session.eval("x + 22;"), Ok(Value::Int(42)));
    }

    #[test]
    fn functions_survive_across_lines() {
        let mut session = Session::new();
        session
            .eval("var count = 0; func bump(): Int { count = count + 1; return count; }")
            .expect("declaration line");
        session.eval("bump();").expect("first call");
        assert_eq!(session.eval("bump();"), Ok(Value::Int(2)));
    }

    #[test]
    fn runtime_errors_leave_earlier_bindings_intact() {
        let mut session = Session::new();
        session.eval("val x = 1;").expect("declaration");
        session.eval("true + 1;").expect_err("illegal operation");
        assert_eq!(session.eval("x;"), Ok(Value::Int(1)));
    }

    #[test]
    fn parse_errors_are_collected_not_thrown() {
        let mut session = Session::new();
        let error = session.eval("val = 3;").unwrap_err();
        let CoreError::Parse(diagnostics) = error else {
            panic!("expected parse diagnostics");
        };
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn resolve_errors_surface_before_evaluation() {
        let mut session = Session::new();
        let error = session.eval("val x = x;").unwrap_err();
        assert!(matches!(
            error,
            CoreError::Resolve(ResolveError::UninitializedVariable { .. })
        ));
    }

    #[test]
    fn compile_reports_type_errors() {
        let mut session = Session::new();
        let error = session.compile("val x: Int = \"hello\";").unwrap_err();
        assert!(matches!(
            error,
            CoreError::Compile(CompileError::UnexpectedType { .. })
        ));
    }

    #[test]
    fn compile_accepts_builtin_calls() {
        let mut session = Session::new();
        session
            .compile("println(\"hi\"); val s = str(42);")
            .expect("builtins are registered");
    }

    #[test]
    fn compile_chunk_produces_runnable_bytecode() {
        let mut session = Session::new();
        let chunk = session.compile_chunk("val x = 2; x + 1;").expect("chunk");
        let result = bytecode::Vm::new().run(&chunk);
        assert_eq!(result, Ok(Value::Int(3)));
    }

    #[test]
    fn illegal_operation_carries_the_operator() {
        let mut session = Session::new();
        let error = session.eval("true + 1;").unwrap_err();
        assert!(matches!(
            error,
            CoreError::Runtime(RuntimeError::IllegalOperation { op, .. }) if op == "+"
        ));
    }

    #[test]
    fn string_concatenation_stringifies() {
        let mut session = Session::new();
        assert_eq!(
            session.eval("\"a\" + 1;"),
            Ok(Value::String("a1".to_string()))
        );
    }

    #[test]
    fn argument_limit_warning_does_not_abort_evaluation() {
        let mut session = Session::new();
        let parameters: Vec<String> = (0..33).map(|i| format!("p{i}: Int")).collect();
        let arguments: Vec<String> = (0..33).map(|i| i.to_string()).collect();
        let source = format!(
            "func wide({}): Int = p32; wide({});",
            parameters.join(", "),
            arguments.join(", ")
        );
        assert_eq!(session.eval(&source), Ok(Value::Int(32)));
    }

    #[test]
    fn closures_keep_their_environment_after_the_block_exits() {
        let mut session = Session::new();
        let result = session.eval(
            "var result = 0; \
             { val secret = 42; func leak(): Int { return secret; } result = leak(); } \
             result;",
        );
        assert_eq!(result, Ok(Value::Int(42)));
    }
}
