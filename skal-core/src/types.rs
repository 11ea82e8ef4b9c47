//! Static type model and the chained type scopes used by the checker.

use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::CompileError;

/// Types of values and expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Int,
    Double,
    String,
    Bool,
    Unit,
    Struct(Rc<StructType>),
    Function(Rc<FunctionType>),
}

#[derive(Debug, PartialEq)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

#[derive(Debug, PartialEq)]
pub struct FunctionType {
    pub parameters: Vec<(String, Type)>,
    pub return_type: Type,
    /// Receiver type for extension functions; `None` for free functions.
    pub receiver: Option<Type>,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Double)
    }

    /// Whether a value of `other` can be bound where `self` is expected.
    ///
    /// Structural equality for now; a place to grow subtyping later.
    pub fn is_assignable_by(&self, other: &Type) -> bool {
        self == other
    }
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, ty)| ty)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("Int"),
            Type::Double => f.write_str("Double"),
            Type::String => f.write_str("String"),
            Type::Bool => f.write_str("Bool"),
            Type::Unit => f.write_str("Unit"),
            Type::Struct(def) => f.write_str(&def.name),
            Type::Function(func) => {
                f.write_str("(")?;
                for (index, (_, ty)) in func.parameters.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ") -> {}", func.return_type)
            }
        }
    }
}

/// One lexical scope of the static world: named types, typed variables
/// and function overload sets. Lookup is delegated to the enclosing
/// [`ContainerStack`]; mutation only ever touches one container.
#[derive(Debug, Default)]
pub struct TypeContainer {
    types: HashMap<String, Type>,
    variables: HashMap<String, Type>,
    functions: HashMap<String, Vec<Rc<FunctionType>>>,
}

impl TypeContainer {
    /// Register a named type. Function types double as an overload;
    /// struct types register their constructor as one.
    pub fn define_type(&mut self, name: &str, ty: Type) {
        match &ty {
            Type::Function(func) => self.define_function(name, func.clone()),
            Type::Struct(def) => {
                let constructor = Rc::new(FunctionType {
                    parameters: def.fields.clone(),
                    return_type: ty.clone(),
                    receiver: None,
                });
                self.define_function(name, constructor);
            }
            _ => {}
        }

        self.types.insert(name.to_string(), ty);
    }

    pub fn define_function(&mut self, name: &str, func: Rc<FunctionType>) {
        self.functions.entry(name.to_string()).or_default().push(func);
    }

    pub fn define(&mut self, name: &str, ty: Type) {
        self.variables.insert(name.to_string(), ty);
    }
}

/// Stack of [`TypeContainer`]s: the innermost container is mutated,
/// lookups walk outward. Equivalent to the parent-linked chain, with
/// strict LIFO push/pop owned by the checker.
#[derive(Debug)]
pub struct ContainerStack {
    scopes: Vec<TypeContainer>,
}

impl ContainerStack {
    /// A stack with one root container holding the primitive types.
    pub fn new() -> ContainerStack {
        let mut root = TypeContainer::default();
        root.define_type("Int", Type::Int);
        root.define_type("Double", Type::Double);
        root.define_type("String", Type::String);
        root.define_type("Bool", Type::Bool);
        root.define_type("Unit", Type::Unit);

        ContainerStack { scopes: vec![root] }
    }

    pub fn push(&mut self) {
        self.scopes.push(TypeContainer::default());
    }

    pub fn pop(&mut self) {
        // the root container is never popped
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn innermost(&mut self) -> &mut TypeContainer {
        self.scopes.last_mut().expect("container stack is never empty")
    }

    pub fn lookup(&self, name: &str) -> Result<Type, CompileError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
            .cloned()
            .ok_or_else(|| CompileError::UnresolvedVar(name.to_string()))
    }

    pub fn lookup_type(&self, name: &str) -> Option<Type> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.types.get(name))
            .cloned()
    }

    pub fn find_type(&self, name: &str) -> Result<Type, CompileError> {
        self.lookup_type(name)
            .ok_or_else(|| CompileError::UnresolvedType(name.to_string()))
    }

    /// All overloads registered under `name`, innermost scope with an
    /// entry wins.
    pub fn lookup_function_overloads(&self, name: &str) -> Vec<Rc<FunctionType>> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.functions.get(name))
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for ContainerStack {
    fn default() -> Self {
        ContainerStack::new()
    }
}

/// First overload whose parameters accept `arguments`, with the given
/// receiver (or none).
pub fn match_overload<'a>(
    overloads: &'a [Rc<FunctionType>],
    arguments: &[Type],
    receiver: Option<&Type>,
) -> Option<&'a Rc<FunctionType>> {
    overloads.iter().find(|func| {
        func.parameters.len() == arguments.len()
            && func.receiver.as_ref() == receiver
            && func
                .parameters
                .iter()
                .zip(arguments)
                .all(|((_, parameter), argument)| parameter.is_assignable_by(argument))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward() {
        let mut containers = ContainerStack::new();
        containers.innermost().define("x", Type::Int);
        containers.push();
        containers.innermost().define("y", Type::String);

        assert_eq!(containers.lookup("x"), Ok(Type::Int));
        assert_eq!(containers.lookup("y"), Ok(Type::String));

        containers.pop();
        assert_eq!(
            containers.lookup("y"),
            Err(CompileError::UnresolvedVar("y".to_string()))
        );
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut containers = ContainerStack::new();
        containers.innermost().define("x", Type::Int);
        containers.push();
        containers.innermost().define("x", Type::String);

        assert_eq!(containers.lookup("x"), Ok(Type::String));
    }

    #[test]
    fn struct_registration_adds_a_constructor_overload() {
        let mut containers = ContainerStack::new();
        let def = Rc::new(StructType {
            name: "Point".to_string(),
            fields: vec![("x".to_string(), Type::Int), ("y".to_string(), Type::Int)],
        });
        containers
            .innermost()
            .define_type("Point", Type::Struct(def));

        let overloads = containers.lookup_function_overloads("Point");
        assert_eq!(overloads.len(), 1);
        let matched = match_overload(&overloads, &[Type::Int, Type::Int], None);
        assert!(matched.is_some());
        assert!(match_overload(&overloads, &[Type::Int], None).is_none());
    }

    #[test]
    fn overload_matching_respects_parameter_types() {
        let int_version = Rc::new(FunctionType {
            parameters: vec![("value".to_string(), Type::Int)],
            return_type: Type::String,
            receiver: None,
        });
        let double_version = Rc::new(FunctionType {
            parameters: vec![("value".to_string(), Type::Double)],
            return_type: Type::String,
            receiver: None,
        });
        let overloads = vec![int_version, double_version];

        let matched =
            match_overload(&overloads, &[Type::Double], None).expect("double overload");
        assert_eq!(matched.parameters[0].1, Type::Double);
    }

    #[test]
    fn primitive_types_render_by_name() {
        assert_eq!(Type::Int.to_string(), "Int");
        let func = Type::Function(Rc::new(FunctionType {
            parameters: vec![("a".to_string(), Type::Int)],
            return_type: Type::Bool,
            receiver: None,
        }));
        assert_eq!(func.to_string(), "(Int) -> Bool");
    }
}
