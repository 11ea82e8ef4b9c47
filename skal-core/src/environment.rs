//! Runtime environments.
//!
//! A chained scope mapping names to values, each binding carrying its
//! mutability. Environments are `Rc`-shared: a closure keeps its
//! defining environment alive by holding a handle, and a frame is freed
//! only when its last holder (closure or active call) is gone.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

#[derive(Debug, Default)]
struct Frame {
    enclosing: Option<Env>,
    values: HashMap<String, Binding>,
}

/// Shared handle to one environment frame.
#[derive(Debug, Clone, Default)]
pub struct Env(Rc<RefCell<Frame>>);

impl Env {
    pub fn global() -> Env {
        Env::default()
    }

    /// A fresh frame enclosed by this one.
    pub fn child(&self) -> Env {
        Env(Rc::new(RefCell::new(Frame {
            enclosing: Some(self.clone()),
            values: HashMap::new(),
        })))
    }

    /// Introduce a binding in this frame. Redefining a name that
    /// already lives here is an error; shadowing belongs to child
    /// frames.
    pub fn define(&self, name: &str, value: Value, mutable: bool) -> Result<(), RuntimeError> {
        let mut frame = self.0.borrow_mut();
        if frame.values.contains_key(name) {
            return Err(RuntimeError::AlreadyDefined(name.to_string()));
        }
        frame.values.insert(name.to_string(), Binding { value, mutable });

        Ok(())
    }

    /// Look a name up, walking the chain outward.
    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        let frame = self.0.borrow();
        if let Some(binding) = frame.values.get(name) {
            return Ok(binding.value.clone());
        }
        match &frame.enclosing {
            Some(parent) => parent.get(name),
            None => Err(RuntimeError::UndefinedVariable(name.to_string())),
        }
    }

    /// Assign to an existing binding, walking the chain outward.
    /// Immutable (`val`) bindings reject the write.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut frame = self.0.borrow_mut();
        if let Some(binding) = frame.values.get_mut(name) {
            if !binding.mutable {
                return Err(RuntimeError::AssignToImmutable(name.to_string()));
            }
            binding.value = value;
            return Ok(());
        }
        match &frame.enclosing {
            Some(parent) => parent.assign(name, value),
            None => Err(RuntimeError::UndefinedVariable(name.to_string())),
        }
    }

    /// Read from the frame exactly `distance` hops up, skipping the
    /// chain walk. Distances come from the resolver.
    pub fn get_at(&self, distance: usize, name: &str) -> Result<Value, RuntimeError> {
        let env = self
            .ancestor(distance)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
        let frame = env.0.borrow();
        frame
            .values
            .get(name)
            .map(|binding| binding.value.clone())
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))
    }

    /// Assign in the frame exactly `distance` hops up.
    pub fn assign_at(
        &self,
        distance: usize,
        name: &str,
        value: Value,
    ) -> Result<(), RuntimeError> {
        let env = self
            .ancestor(distance)
            .ok_or_else(|| RuntimeError::UndefinedVariable(name.to_string()))?;
        let mut frame = env.0.borrow_mut();
        match frame.values.get_mut(name) {
            Some(binding) if binding.mutable => {
                binding.value = value;
                Ok(())
            }
            Some(_) => Err(RuntimeError::AssignToImmutable(name.to_string())),
            None => Err(RuntimeError::UndefinedVariable(name.to_string())),
        }
    }

    fn ancestor(&self, distance: usize) -> Option<Env> {
        let mut env = self.clone();
        for _ in 0..distance {
            let parent = env.0.borrow().enclosing.clone()?;
            env = parent;
        }
        Some(env)
    }
}
