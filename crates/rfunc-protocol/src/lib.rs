//! Wire protocol for rfunc.
//!
//! This crate defines everything two rfunc peers agree on before any
//! socket is opened:
//!
//! - **Values** ([`Value`], [`ValueType`]): the typed primitives passed
//!   as arguments and results.
//! - **Specifications** ([`ArgumentSpecification`],
//!   [`MethodSpecification`], [`NamespaceSpecification`]): what can be
//!   called and under which signature.
//! - **Packets** ([`Packet`], [`PacketBody`], [`PacketType`]) and their
//!   framing ([`PacketCodec`]).
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer is pure: no I/O, no async. Transport drives it.
//!
//! ```text
//! Transport (bytes) → Protocol (Packet) → Server / Client
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod packet;
mod spec;
mod value;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{
    decode_body_len, decode_packet, encode_packet, FrameHeader, PacketCodec, HEADER_LEN,
    LENGTH_PREFIX_LEN, MAX_BODY_LEN,
};
pub use error::ProtocolError;
pub use packet::{Packet, PacketBody, PacketType, HANDSHAKE_TRANSACTION_ID};
pub use spec::{
    Argument, ArgumentSpecification, MethodSpecification, NamespaceSpecification, MAX_ARGUMENTS,
};
pub use value::{Value, ValueType};

/// Version string exchanged in the handshake. Peers must match exactly.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
