//! Error types for the registry layer.

/// A handler ran and reported failure.
///
/// Callback handlers return this to signal "the call was understood but
/// could not be completed". The server forwards the message to the
/// caller inside an ERROR packet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct InvocationError {
    message: String,
}

impl InvocationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while registering or dispatching methods.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A method with the same name and argument types is already
    /// registered in this namespace.
    #[error("method {method} already exists in namespace {namespace:?}")]
    DuplicateMethod { namespace: String, method: String },

    /// The namespace does not exist.
    #[error("no namespace named {0:?}")]
    NoSuchNamespace(String),

    /// No method in the namespace matches the name and argument types.
    #[error("no method {method} in namespace {namespace:?}")]
    NoSuchMethod { namespace: String, method: String },

    /// The handler cannot serve the declared signature.
    #[error("invalid handler: {0}")]
    InvalidHandler(String),

    /// A namespace name cannot travel on the wire.
    #[error("invalid namespace name {0:?}")]
    InvalidName(String),

    /// The handler itself failed.
    #[error(transparent)]
    Invocation(#[from] InvocationError),
}
