//! The full set of namespaces a server exposes.

use rfunc_protocol::{ArgumentSpecification, MethodSpecification, Value};

use crate::{InvocationError, Method, Namespace, RegistryError};

/// Name of the namespace every environment always has.
pub const DEFAULT_NAMESPACE: &str = "";

/// Maps namespace names to [`Namespace`]s.
///
/// The default namespace (`""`) exists for the environment's whole
/// lifetime and is always listed first; other namespaces follow in the
/// order they were added.
#[derive(Debug, Clone)]
pub struct Environment {
    // Index 0 is always the default namespace.
    namespaces: Vec<Namespace>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            namespaces: vec![Namespace::new(DEFAULT_NAMESPACE)],
        }
    }

    /// Returns the namespace called `name`, creating it if needed.
    ///
    /// # Errors
    /// [`RegistryError::InvalidName`] if `name` contains a NUL character.
    pub fn add_namespace(&mut self, name: &str) -> Result<&mut Namespace, RegistryError> {
        if name.contains('\0') {
            return Err(RegistryError::InvalidName(name.to_owned()));
        }
        let index = match self.position(name) {
            Some(index) => index,
            None => {
                tracing::debug!(namespace = %name, "namespace added");
                self.namespaces.push(Namespace::new(name));
                self.namespaces.len() - 1
            }
        };
        Ok(&mut self.namespaces[index])
    }

    /// Registers `method` under `namespace`, creating the namespace if
    /// needed.
    pub fn add_method(&mut self, namespace: &str, method: Method) -> Result<(), RegistryError> {
        self.add_namespace(namespace)?.add(method)
    }

    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.name() == name)
    }

    pub fn namespace_mut(&mut self, name: &str) -> Option<&mut Namespace> {
        self.namespaces.iter_mut().find(|ns| ns.name() == name)
    }

    pub fn default_namespace(&self) -> &Namespace {
        &self.namespaces[0]
    }

    pub fn default_namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespaces[0]
    }

    pub fn contains_namespace(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes a namespace and all its methods. Removing the default
    /// namespace only empties it. Returns whether the name existed.
    pub fn remove_namespace(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(0) => {
                self.namespaces[0].remove_all();
                true
            }
            Some(index) => {
                self.namespaces.remove(index);
                true
            }
            None => false,
        }
    }

    /// Namespace names, default first.
    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.iter().map(|ns| ns.name().to_owned()).collect()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.iter()
    }

    /// Invokes `qualified_name` (`"ns.method"`, or `"method"` for the
    /// default namespace) with `values`, resolved by their types.
    ///
    /// # Errors
    /// [`RegistryError::NoSuchMethod`] if either the namespace or the
    /// signature is unknown; [`RegistryError::Invocation`] if the handler
    /// fails.
    pub async fn invoke(&self, qualified_name: &str, values: &[Value]) -> Result<Value, RegistryError> {
        let (namespace, name) = split_qualified(qualified_name);
        let arguments = ArgumentSpecification::from_values(values);
        let method = self
            .namespace(namespace)
            .and_then(|ns| ns.resolve(name, &arguments))
            .ok_or_else(|| RegistryError::NoSuchMethod {
                namespace: namespace.to_owned(),
                method: format!("{name}({arguments})"),
            })?;
        Ok(method.invoke(values).await?)
    }

    /// Invokes the method matching `spec` exactly. The description in
    /// `spec` is ignored.
    ///
    /// # Errors
    /// - [`RegistryError::NoSuchNamespace`] / [`RegistryError::NoSuchMethod`]
    ///   if nothing matches.
    /// - [`RegistryError::Invocation`] if `values` do not have the types
    ///   `spec` declares, or if the handler fails.
    pub async fn invoke_spec(
        &self,
        namespace: &str,
        spec: &MethodSpecification,
        values: &[Value],
    ) -> Result<Value, RegistryError> {
        let ns = self
            .namespace(namespace)
            .ok_or_else(|| RegistryError::NoSuchNamespace(namespace.to_owned()))?;
        let method = ns.resolve(spec.name(), spec.arguments()).ok_or_else(|| {
            RegistryError::NoSuchMethod {
                namespace: namespace.to_owned(),
                method: spec.to_string(),
            }
        })?;

        let actual = ArgumentSpecification::from_values(values);
        if &actual != spec.arguments() {
            return Err(InvocationError::new(format!(
                "{} expects ({}), got ({actual})",
                spec.name(),
                spec.arguments()
            ))
            .into());
        }
        Ok(method.invoke(values).await?)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.namespaces.iter().position(|ns| ns.name() == name)
    }
}

/// Splits `"ns.method"` on the first dot. No dot means the default
/// namespace.
pub fn split_qualified(qualified_name: &str) -> (&str, &str) {
    qualified_name
        .split_once('.')
        .unwrap_or((DEFAULT_NAMESPACE, qualified_name))
}
