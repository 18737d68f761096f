//! A named group of methods.

use rfunc_protocol::{ArgumentSpecification, MethodSpecification};

use crate::{Method, RegistryError};

/// Methods sharing a namespace, in insertion order.
///
/// Methods may be overloaded by argument types; no two share the same
/// name and ordered argument types.
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    methods: Vec<Method>,
}

impl Namespace {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `method`.
    ///
    /// # Errors
    /// [`RegistryError::DuplicateMethod`] if a method with the same name
    /// and argument types exists. Descriptions do not distinguish
    /// methods.
    pub fn add(&mut self, method: Method) -> Result<(), RegistryError> {
        let spec = method.spec();
        if self.contains(spec.name(), spec.arguments()) {
            return Err(RegistryError::DuplicateMethod {
                namespace: self.name.clone(),
                method: spec.to_string(),
            });
        }
        tracing::debug!(namespace = %self.name, method = %spec, "method registered");
        self.methods.push(method);
        Ok(())
    }

    /// Finds the method with exactly this name and argument types.
    pub fn resolve(&self, name: &str, arguments: &ArgumentSpecification) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.spec().matches(name, arguments))
    }

    pub fn contains(&self, name: &str, arguments: &ArgumentSpecification) -> bool {
        self.resolve(name, arguments).is_some()
    }

    /// Specifications of every method, in registration order.
    pub fn list(&self) -> Vec<MethodSpecification> {
        self.methods.iter().map(|m| m.spec().clone()).collect()
    }

    /// Unregisters and returns the matching method, if any.
    pub fn remove(&mut self, name: &str, arguments: &ArgumentSpecification) -> Option<Method> {
        let index = self
            .methods
            .iter()
            .position(|m| m.spec().matches(name, arguments))?;
        Some(self.methods.remove(index))
    }

    pub fn remove_all(&mut self) {
        self.methods.clear();
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
