//! Error types for the protocol layer.
//!
//! Each crate in rfunc defines its own error enum. A `ProtocolError`
//! always means the bytes (or the text) could not be turned into a valid
//! value, specification, or packet. It never says anything about the
//! network or about which methods exist.

/// Errors that can occur while encoding or decoding rfunc data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The bytes are truncated, garbled, or otherwise do not follow the
    /// wire grammar. Fatal to the connection that produced them.
    #[error("malformed wire data: {0}")]
    Malformed(String),

    /// A value or argument carried a type tag outside the closed set.
    #[error("unsupported value type tag 0x{0:02x}")]
    UnsupportedType(u8),

    /// A packet header carried an identifier that names no packet type.
    #[error("unknown packet type identifier {0:?}")]
    UnknownPacketType(String),

    /// Text could not be parsed as an argument specification.
    #[error("parse error: {0}")]
    Parse(String),

    /// A constructor rejected its input (e.g. an embedded NUL byte).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An argument specification has more entries than fit in its
    /// one-byte count.
    #[error("too many arguments: {0} (at most 255 fit on the wire)")]
    TooManyArguments(usize),

    /// A packet was serialized before a transaction id was assigned.
    #[error("packet has no transaction id assigned")]
    UnassignedTransactionId,
}

impl ProtocolError {
    pub(crate) fn truncated(what: &str, needed: usize, available: usize) -> Self {
        Self::Malformed(format!(
            "truncated {what}: needed {needed} bytes, {available} available"
        ))
    }
}
