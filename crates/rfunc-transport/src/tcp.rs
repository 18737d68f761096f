//! TCP transport implementation.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

use crate::{Connection, Transport, TransportError};

/// A TCP-based [`Transport`] that listens for incoming connections.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Stream = TcpStream;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Connection<TcpStream>, Self::Error> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        let conn = Connection::new(stream);
        tracing::debug!(conn_id = %conn.id(), %peer, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> Result<SocketAddr, Self::Error> {
        Ok(self.listener.local_addr()?)
    }
}

/// Opens a client-side connection to `addr`.
///
/// `timeout` bounds the connect and becomes the connection's read
/// timeout. The handshake is left to the caller.
pub async fn connect<A: ToSocketAddrs>(
    addr: A,
    timeout: Option<Duration>,
) -> Result<Connection<TcpStream>, TransportError> {
    let stream = match timeout {
        Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout(limit))??,
        None => TcpStream::connect(addr).await?,
    };
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    let conn = Connection::new(stream).with_read_timeout(timeout);
    tracing::trace!(conn_id = %conn.id(), %peer, "connected");
    Ok(conn)
}
