//! Unified error type for rfunc.

use rfunc_protocol::ProtocolError;
use rfunc_registry::RegistryError;
use rfunc_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `rfunc` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant generates `From` impls, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RfuncError {
    /// A transport-level error (socket, handshake, timeout).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid specification).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry-level error (duplicate, missing, handler failure).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The server answered the call with an ERROR packet.
    #[error("remote error: {0}")]
    Remote(String),

    /// The client's cache has no such namespace.
    #[error("no namespace named {0:?} on the server")]
    NoSuchNamespace(String),

    /// The client's cache has no method with this name and signature.
    #[error("no method {method} in namespace {namespace:?} on the server")]
    NoSuchMethod { namespace: String, method: String },

    /// A validated call was attempted before discovery.
    #[error("client is not initialized")]
    NotInitialized,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The server task panicked or was cancelled.
    #[error("server task failed: {0}")]
    ServerTask(#[from] tokio::task::JoinError),

    /// The log sink could not be installed.
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: RfuncError = TransportError::ConnectionClosed.into();
        assert!(matches!(err, RfuncError::Transport(_)));
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: RfuncError = ProtocolError::UnsupportedType(0x42).into();
        assert!(matches!(err, RfuncError::Protocol(_)));
        assert!(err.to_string().contains("0x42"));
    }

    #[test]
    fn test_from_registry_error() {
        let err: RfuncError = RegistryError::NoSuchNamespace("math".into()).into();
        assert!(matches!(err, RfuncError::Registry(_)));
    }

    #[test]
    fn test_remote_message_is_shown() {
        let err = RfuncError::Remote("invocation error: boom".into());
        assert_eq!(err.to_string(), "remote error: invocation error: boom");
    }
}
