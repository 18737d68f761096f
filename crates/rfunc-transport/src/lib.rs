//! Transport layer for rfunc.
//!
//! Provides the [`Connection`] state machine that turns a byte stream
//! into a handshaken packet channel, and the [`Transport`] trait with a
//! TCP implementation ([`TcpTransport`]) for accepting them.

#![allow(async_fn_in_trait)]

mod connection;
mod error;
mod tcp;

pub use connection::{Connection, ConnectionState};
pub use error::TransportError;
pub use tcp::{TcpTransport, connect};

use std::fmt;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

/// Opaque identifier for a connection, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The byte stream underneath each accepted connection.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection. The returned
    /// connection has not shaken hands yet.
    async fn accept(&mut self) -> Result<Connection<Self::Stream>, Self::Error>;

    /// The address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, Self::Error>;
}
