//! Runtime object model.
//!
//! Values are cheap to clone: compound values (structs, instances,
//! callables) are `Rc`-shared, so equality on them is identity, not
//! structure. Instances keep their fields behind a `RefCell` because
//! field sets go through shared handles.

use core::fmt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Parameter, Stmt};
use crate::environment::Env;
use crate::error::RuntimeError;

pub type NativeFn = fn(&[Value]) -> Result<Value, RuntimeError>;

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Unit,
    /// A struct type object; callable as its constructor.
    Struct(Rc<StructValue>),
    Instance(Rc<InstanceValue>),
    Function(Rc<FunctionValue>),
    Native(Rc<NativeValue>),
}

#[derive(Debug)]
pub struct StructValue {
    pub name: String,
    /// Field names in declaration order.
    pub fields: Vec<String>,
    /// Extension functions registered on this struct.
    pub functions: RefCell<HashMap<String, Rc<FunctionValue>>>,
}

#[derive(Debug)]
pub struct InstanceValue {
    pub definition: Rc<StructValue>,
    pub fields: RefCell<HashMap<String, Value>>,
}

/// A user function value. Closes over its defining environment by
/// shared reference; `receiver` carries the bound `this` once the
/// function has been fetched through an instance.
#[derive(Debug)]
pub struct FunctionValue {
    pub name: Option<String>,
    pub parameters: Vec<Parameter>,
    pub body: Rc<Vec<Stmt>>,
    pub closure: Env,
    pub receiver: Option<Value>,
}

#[derive(Debug)]
pub struct NativeValue {
    pub name: String,
    pub arity: usize,
    pub call: NativeFn,
}

impl FunctionValue {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous function")
    }

    /// A copy of this function with `this` bound to `receiver`.
    pub fn bind(&self, receiver: Value) -> FunctionValue {
        FunctionValue {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            body: self.body.clone(),
            closure: self.closure.clone(),
            receiver: Some(receiver),
        }
    }
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    /// Conditions and logical operands must be Bool; anything else is a
    /// runtime type error rather than silently falsy.
    pub fn is_truthy(&self) -> Result<bool, RuntimeError> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(RuntimeError::TypeMismatch(format!(
                "expected a Bool but got {}",
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Int(_) => "Int".to_string(),
            Value::Double(_) => "Double".to_string(),
            Value::String(_) => "String".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Unit => "Unit".to_string(),
            Value::Struct(def) => format!("struct {}", def.name),
            Value::Instance(instance) => instance.definition.name.clone(),
            Value::Function(_) | Value::Native(_) => "function".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Unit, Value::Unit) => true,
            (Value::Struct(a), Value::Struct(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Unit => f.write_str("Unit"),
            Value::Struct(def) => write!(f, "struct {}", def.name),
            Value::Instance(instance) => {
                write!(f, "{}(", instance.definition.name)?;
                let fields = instance.fields.borrow();
                for (index, name) in instance.definition.fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    match fields.get(name) {
                        Some(value) => write!(f, "{name}: {value}")?,
                        None => write!(f, "{name}: ?")?,
                    }
                }
                f.write_str(")")
            }
            Value::Function(func) => write!(f, "func {}", func.display_name()),
            Value::Native(native) => write!(f, "native func {}", native.name),
        }
    }
}
