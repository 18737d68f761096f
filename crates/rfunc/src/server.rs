//! `RfuncServer` builder and accept loop.
//!
//! The server serves one connection at a time on a single task. Accepts
//! and reads are bounded by the idle timeout so the loop notices a
//! shutdown request within roughly that interval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rfunc_registry::Environment;
use rfunc_transport::{TcpTransport, Transport, TransportError};
use tokio::task::JoinHandle;

use crate::handler::handle_connection;
use crate::{RfuncError, ServerConfig};

/// Builder for configuring an rfunc server.
///
/// # Example
///
/// ```rust,no_run
/// use rfunc::prelude::*;
///
/// # async fn run() -> Result<(), RfuncError> {
/// let server = RfuncServer::builder("127.0.0.1:7000")
///     .idle_timeout(std::time::Duration::from_millis(500))
///     .build(Environment::new())
///     .await?;
/// let handle = server.start()?;
/// // ...
/// let environment = handle.terminate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RfuncServerBuilder {
    config: ServerConfig,
}

impl RfuncServerBuilder {
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            config: ServerConfig {
                bind_addr: bind_addr.into(),
                ..ServerConfig::default()
            },
        }
    }

    /// Replaces the whole configuration, bind address included.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Overrides the version announced in handshakes.
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.config.protocol_version = version.into();
        self
    }

    /// Binds the listener and takes ownership of `environment`.
    pub async fn build(self, environment: Environment) -> Result<RfuncServer, RfuncError> {
        let config = self.config.validated();
        let transport = TcpTransport::bind(config.bind_addr.as_str()).await?;
        Ok(RfuncServer {
            transport,
            environment,
            config,
        })
    }
}

/// A bound, not yet running rfunc server.
#[derive(Debug)]
pub struct RfuncServer {
    transport: TcpTransport,
    environment: Environment,
    config: ServerConfig,
}

impl RfuncServer {
    pub fn builder(bind_addr: impl Into<String>) -> RfuncServerBuilder {
        RfuncServerBuilder::new(bind_addr)
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RfuncError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawns the accept loop on its own task.
    ///
    /// # Errors
    /// Fails only if the listener's address cannot be read.
    pub fn start(self) -> Result<ServerHandle, RfuncError> {
        let local_addr = self.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let terminated = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run(
            self.transport,
            self.environment,
            self.config,
            Arc::clone(&shutdown),
            Arc::clone(&terminated),
        ));

        Ok(ServerHandle {
            local_addr,
            shutdown: RaiseOnDrop(shutdown),
            terminated,
            task,
        })
    }
}

/// Control over a running server.
///
/// Dropping the handle requests shutdown but does not wait for it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: RaiseOnDrop,
    terminated: Arc<AtomicBool>,
    task: JoinHandle<Environment>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether shutdown has been requested.
    pub fn terminate_requested(&self) -> bool {
        self.shutdown.0.load(Ordering::SeqCst)
    }

    /// Whether the accept loop has exited.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Stops the server and hands back its environment.
    ///
    /// A session in progress runs to completion (or to its idle timeout)
    /// first.
    pub async fn terminate(self) -> Result<Environment, RfuncError> {
        self.shutdown.0.store(true, Ordering::SeqCst);
        tracing::info!(addr = %self.local_addr, "server shutdown requested");
        Ok(self.task.await?)
    }
}

/// Raises its flag when dropped: the handle's shutdown request, and the
/// loop's terminated mark even if it unwinds.
#[derive(Debug)]
struct RaiseOnDrop(Arc<AtomicBool>);

impl Drop for RaiseOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// The accept loop. Returns the environment once shutdown is observed.
async fn run<T>(
    mut transport: T,
    environment: Environment,
    config: ServerConfig,
    shutdown: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
) -> Environment
where
    T: Transport<Error = TransportError>,
{
    let _terminated = RaiseOnDrop(terminated);
    let idle = config.idle_timeout();
    tracing::info!(
        version = %config.protocol_version,
        idle_timeout_ms = config.idle_timeout_ms,
        "rfunc server running"
    );

    while !shutdown.load(Ordering::SeqCst) {
        let conn = match tokio::time::timeout(idle, transport.accept()).await {
            Err(_) => {
                tracing::trace!("no connection within idle timeout");
                continue;
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "accept failed");
                continue;
            }
            Ok(Ok(conn)) => conn,
        };

        let conn = conn
            .with_version(config.protocol_version.as_str())
            .with_read_timeout(Some(idle));
        let conn_id = conn.id();

        match handle_connection(conn, &environment).await {
            Ok(()) => {}
            Err(e @ TransportError::Timeout(_)) => {
                tracing::error!(%conn_id, error = %e, "session timed out");
            }
            Err(e @ TransportError::VersionMismatch { .. }) => {
                tracing::warn!(%conn_id, error = %e, "handshake rejected");
            }
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "session failed");
            }
        }
    }

    tracing::info!("rfunc server stopped");
    environment
}
