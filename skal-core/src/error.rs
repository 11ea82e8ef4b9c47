//! Error strata of the pipeline.
//!
//! The parser collects recoverable [`Diagnostic`]s; everything after it
//! stops at the first error of its own stratum: [`ResolveError`] for the
//! resolver, [`CompileError`] for the type checker and the bytecode
//! backend, [`RuntimeError`] for the evaluator. [`CoreError`] is the
//! umbrella the session hands to callers.

use thiserror::Error;

use crate::diagnostic::Diagnostic;

/// Fatal errors of the resolution pass. No recovery: the passes after
/// the resolver assume a well-formed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unresolved variable {name} at line {line}")]
    UnresolvedVariable { name: String, line: u32 },
    #[error("trying to access {name} before it is initialized at line {line}")]
    UninitializedVariable { name: String, line: u32 },
    #[error("{name} is already declared in this scope at line {line}")]
    AlreadyDeclared { name: String, line: u32 },
}

/// Fatal errors of the type checker and the chunk compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("variable {0} not found")]
    UnresolvedVar(String),
    #[error("type {0} not found")]
    UnresolvedType(String),
    #[error("field {field} not found on {ty}")]
    UnresolvedField { field: String, ty: String },
    #[error("expected {expected} but got {found}")]
    UnexpectedType { expected: String, found: String },
    #[error("missing return in the body of {0}")]
    MissingReturn(String),
    #[error("invalid literal type: {0}")]
    InvalidType(String),
    #[error("no overload of {name} accepts ({arguments})")]
    NoMatchingOverload { name: String, arguments: String },
    #[error("the bytecode backend does not support {0} yet")]
    Unsupported(&'static str),
    #[error("too many constants in one chunk")]
    TooManyConstants,
}

/// Errors surfaced while evaluating. Fatal to the current unit but
/// recoverable at the session boundary: the REPL reports them and keeps
/// accepting input with previously defined bindings intact.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("illegal operation {op}: {detail}")]
    IllegalOperation { op: String, detail: String },
    #[error("{0}")]
    TypeMismatch(String),
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("{0} is immutable and cannot be reassigned")]
    AssignToImmutable(String),
    #[error("{0} is already defined in this scope")]
    AlreadyDefined(String),
    #[error("field {field} not found on {receiver}")]
    UnresolvedField { field: String, receiver: String },
    #[error("{name} expects {expected} argument(s) but received {given}")]
    ArityMismatch {
        name: String,
        expected: usize,
        given: usize,
    },
    #[error("malformed chunk: {0}")]
    MalformedChunk(String),
}

/// Umbrella error for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("aborted with {} parse error(s)", .0.len())]
    Parse(Vec<Diagnostic>),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
