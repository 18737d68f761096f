//! The framed, handshaken request/reply channel both peers speak.
//!
//! A [`Connection`] wraps any byte stream. Tests drive it over
//! `tokio::io::duplex`; the server and client use `TcpStream`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rfunc_protocol::{
    HEADER_LEN, LENGTH_PREFIX_LEN, PROTOCOL_VERSION, Packet, PacketBody, PacketCodec,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a [`Connection`]. Moves strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    HandshakeInFlight,
    Ready,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Created => "created",
            ConnectionState::HandshakeInFlight => "handshaking",
            ConnectionState::Ready => "ready",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One end of an rfunc conversation.
///
/// Every operation that fails with an I/O, framing or timeout error
/// leaves the connection `Closed`: the stream position is unknown after
/// a partial read, so nothing further can be trusted.
pub struct Connection<S> {
    id: ConnectionId,
    stream: S,
    state: ConnectionState,
    version: String,
    next_transaction_id: i64,
    read_timeout: Option<Duration>,
    codec: PacketCodec,
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("version", &self.version)
            .field("next_transaction_id", &self.next_transaction_id)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps `stream` in a fresh connection speaking [`PROTOCOL_VERSION`].
    pub fn new(stream: S) -> Self {
        Self {
            id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            stream,
            state: ConnectionState::Created,
            version: PROTOCOL_VERSION.to_owned(),
            next_transaction_id: 0,
            read_timeout: None,
            codec: PacketCodec::default(),
        }
    }

    /// Overrides the version announced in the handshake.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_codec(mut self, codec: PacketCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Exchanges HANDSHAKE packets and checks the peer's version.
    ///
    /// Both sides call this; each writes first and then reads, so the
    /// order in which the two peers start does not matter.
    ///
    /// # Errors
    /// - [`TransportError::InvalidState`] unless the connection is new.
    /// - [`TransportError::UnexpectedPacket`] if the peer's first packet
    ///   is not a HANDSHAKE.
    /// - [`TransportError::VersionMismatch`] if the versions differ.
    ///
    /// Any failure leaves the connection `Closed`.
    pub async fn shake_hands(&mut self) -> Result<(), TransportError> {
        self.require(ConnectionState::Created, "shake hands")?;
        self.state = ConnectionState::HandshakeInFlight;

        let hello = Packet::handshake(self.version.clone());
        self.write_packet(&hello).await?;
        let reply = self.read_packet().await?;

        let remote = match reply.into_body() {
            PacketBody::Handshake { version } => version,
            other => {
                self.state = ConnectionState::Closed;
                return Err(TransportError::UnexpectedPacket {
                    expected: "handshake",
                    actual: other.packet_type(),
                });
            }
        };
        if remote != self.version {
            self.state = ConnectionState::Closed;
            return Err(TransportError::VersionMismatch {
                local: self.version.clone(),
                remote,
            });
        }

        self.state = ConnectionState::Ready;
        tracing::debug!(conn_id = %self.id, version = %self.version, "handshake complete");
        Ok(())
    }

    /// Sends `body` under the next transaction id and returns that id.
    pub async fn send(&mut self, body: PacketBody) -> Result<i64, TransportError> {
        self.require(ConnectionState::Ready, "send")?;
        let id = self.next_transaction_id();
        self.write_packet(&Packet::new(body).with_transaction_id(id))
            .await?;
        Ok(id)
    }

    /// Sends `body` and returns the next packet the peer writes.
    ///
    /// The reply's transaction id is not compared with the request's;
    /// request and reply strictly alternate on a connection.
    pub async fn send_and_await_reply(&mut self, body: PacketBody) -> Result<Packet, TransportError> {
        self.send(body).await?;
        self.read_packet().await
    }

    /// Reads the next packet from the peer.
    pub async fn await_packet(&mut self) -> Result<Packet, TransportError> {
        self.require(ConnectionState::Ready, "await a packet")?;
        self.read_packet().await
    }

    /// Answers `request`, reusing its transaction id.
    pub async fn reply(&mut self, request: &Packet, body: PacketBody) -> Result<(), TransportError> {
        self.require(ConnectionState::Ready, "reply")?;
        let mut packet = Packet::new(body);
        if let Some(id) = request.transaction_id() {
            packet.set_transaction_id(id);
        }
        self.write_packet(&packet).await
    }

    /// Tells the peer we are done, then shuts the stream down.
    ///
    /// The stream is shut down even when writing TERMINATE fails; the
    /// write error is still returned.
    pub async fn terminate(&mut self) -> Result<(), TransportError> {
        let sent = if self.state == ConnectionState::Ready {
            let id = self.next_transaction_id();
            self.write_packet(&Packet::new(PacketBody::Terminate).with_transaction_id(id))
                .await
        } else {
            Ok(())
        };
        let closed = self.close().await;
        sent.and(closed)
    }

    /// Shuts the stream down without saying goodbye.
    ///
    /// Safe to call repeatedly. Shutdown errors are only reported the
    /// first time; after a failed read or write they are expected.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        let was = std::mem::replace(&mut self.state, ConnectionState::Closed);
        tracing::trace!(conn_id = %self.id, previous = %was, "closing connection");
        match self.stream.shutdown().await {
            Err(e) if was != ConnectionState::Closed => Err(TransportError::Io(e)),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require(&self, expected: ConnectionState, operation: &'static str) -> Result<(), TransportError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransportError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn next_transaction_id(&mut self) -> i64 {
        let id = self.next_transaction_id;
        self.next_transaction_id += 1;
        id
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let result = self.write_frame(packet).await;
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    async fn write_frame(&mut self, packet: &Packet) -> Result<(), TransportError> {
        let bytes = self.codec.encode(packet)?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        tracing::trace!(
            conn_id = %self.id,
            packet_type = %packet.packet_type(),
            transaction_id = ?packet.transaction_id(),
            "packet sent"
        );
        Ok(())
    }

    async fn read_packet(&mut self) -> Result<Packet, TransportError> {
        let result = match self.read_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.read_frame()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(limit)),
            },
            None => self.read_frame().await,
        };
        if result.is_err() {
            self.state = ConnectionState::Closed;
        }
        result
    }

    async fn read_frame(&mut self) -> Result<Packet, TransportError> {
        let mut header = [0u8; HEADER_LEN];
        self.read_exact(&mut header).await?;
        let header = self.codec.decode_header(&header)?;

        let mut body = Vec::new();
        if header.packet_type.contains_data() {
            let mut prefix = [0u8; LENGTH_PREFIX_LEN];
            self.read_exact(&mut prefix).await?;
            let len = self.codec.decode_body_len(prefix)?;
            body.resize(len, 0);
            self.read_exact(&mut body).await?;
        }

        let packet = self.codec.decode_body(header, &body)?;
        tracing::trace!(
            conn_id = %self.id,
            packet_type = %header.packet_type,
            transaction_id = header.transaction_id,
            "packet received"
        );
        Ok(packet)
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        match self.stream.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(TransportError::ConnectionClosed)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::HandshakeInFlight.to_string(), "handshaking");
        assert_eq!(ConnectionState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, b) = tokio::io::duplex(64);
        let a = Connection::new(a);
        let b = Connection::new(b);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_defaults() {
        let (a, _b) = tokio::io::duplex(64);
        let conn = Connection::new(a);
        assert_eq!(conn.state(), ConnectionState::Created);
        assert_eq!(conn.version(), PROTOCOL_VERSION);
        assert_eq!(conn.read_timeout(), None);
    }

    #[tokio::test]
    async fn test_operations_before_handshake_are_rejected() {
        let (a, _b) = tokio::io::duplex(64);
        let mut conn = Connection::new(a);
        let err = conn.await_packet().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::InvalidState {
                state: ConnectionState::Created,
                ..
            }
        ));
        let err = conn.send(PacketBody::NamespaceListRequest).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (a, _b) = tokio::io::duplex(64);
        let mut conn = Connection::new(a);
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }
}
