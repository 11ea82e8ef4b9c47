//! Host-provided native functions.
//!
//! One table drives both worlds: [`register_types`] adds each entry to
//! the root type container as a function overload, [`install`] defines
//! the runtime callables in the global environment. Overloads share one
//! runtime entry per name; dispatch on the value itself happens inside
//! the native call.

use std::io::Write;
use std::rc::Rc;

use crate::environment::Env;
use crate::error::RuntimeError;
use crate::types::{ContainerStack, FunctionType, Type};
use crate::value::{NativeFn, NativeValue, Value};

pub struct Builtin {
    pub name: &'static str,
    pub parameters: Vec<(&'static str, Type)>,
    pub return_type: Type,
    pub call: NativeFn,
}

/// The complete list of builtins known to the core.
pub fn builtins() -> Vec<Builtin> {
    vec![
        Builtin {
            name: "println",
            parameters: vec![("value", Type::String)],
            return_type: Type::Unit,
            call: native_println,
        },
        Builtin {
            name: "print",
            parameters: vec![("value", Type::String)],
            return_type: Type::Unit,
            call: native_print,
        },
        Builtin {
            name: "str",
            parameters: vec![("value", Type::Int)],
            return_type: Type::String,
            call: native_str,
        },
        Builtin {
            name: "str",
            parameters: vec![("value", Type::Double)],
            return_type: Type::String,
            call: native_str,
        },
        Builtin {
            name: "len",
            parameters: vec![("value", Type::String)],
            return_type: Type::Int,
            call: native_len,
        },
    ]
}

/// Register every builtin signature in the root type container.
pub fn register_types(containers: &mut ContainerStack) {
    for builtin in builtins() {
        let parameters = builtin
            .parameters
            .iter()
            .map(|(name, ty)| (name.to_string(), ty.clone()))
            .collect();
        containers.innermost().define_function(
            builtin.name,
            Rc::new(FunctionType {
                parameters,
                return_type: builtin.return_type.clone(),
                receiver: None,
            }),
        );
    }
}

/// Define the runtime callables in `env`. Overloaded names share one
/// native value.
pub fn install(env: &Env) {
    for builtin in builtins() {
        let native = Value::Native(Rc::new(NativeValue {
            name: builtin.name.to_string(),
            arity: builtin.parameters.len(),
            call: builtin.call,
        }));
        // a second overload of the same name is already covered
        let _ = env.define(builtin.name, native, false);
    }
}

fn native_println(args: &[Value]) -> Result<Value, RuntimeError> {
    println!("{}", args.first().unwrap_or(&Value::Unit));
    Ok(Value::Unit)
}

fn native_print(args: &[Value]) -> Result<Value, RuntimeError> {
    print!("{}", args.first().unwrap_or(&Value::Unit));
    std::io::stdout().flush().ok();
    Ok(Value::Unit)
}

fn native_str(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::String(
        args.first().unwrap_or(&Value::Unit).to_string(),
    ))
}

fn native_len(args: &[Value]) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::String(text)) => Ok(Value::Int(text.chars().count() as i64)),
        other => Err(RuntimeError::TypeMismatch(format!(
            "len expects a String but got {}",
            other.unwrap_or(&Value::Unit).type_name()
        ))),
    }
}
