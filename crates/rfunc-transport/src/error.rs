use std::time::Duration;

use rfunc_protocol::{PacketType, ProtocolError};

use crate::ConnectionState;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The socket failed underneath us (bind, accept, connect, read, write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream while a packet was expected.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// A read (or connect) did not finish within the configured timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The bytes on the wire did not form a valid packet.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A well-formed packet arrived where a different type was required.
    #[error("unexpected packet: expected {expected}, got {actual}")]
    UnexpectedPacket {
        expected: &'static str,
        actual: PacketType,
    },

    /// The handshake carried a different protocol version.
    #[error("protocol version mismatch: local {local}, remote {remote}")]
    VersionMismatch { local: String, remote: String },

    /// The operation is not allowed in the connection's current state.
    #[error("cannot {operation} while connection is {state}")]
    InvalidState {
        operation: &'static str,
        state: ConnectionState,
    },
}

impl TransportError {
    /// `true` for [`TransportError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}
