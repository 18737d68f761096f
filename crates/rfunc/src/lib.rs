//! # rfunc
//!
//! Remote invocation of namespaced, overloaded methods over TCP.
//!
//! A server registers [`Method`]s in an [`Environment`] and serves them
//! with [`RfuncServer`]. A [`Client`] discovers what the server exposes
//! and calls it by name; the argument types of each call select the
//! overload.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rfunc::prelude::*;
//!
//! # async fn demo() -> Result<(), RfuncError> {
//! let mut env = Environment::new();
//! let add = MethodSpecification::new(
//!     "add",
//!     "adds two numbers",
//!     ArgumentSpecification::parse("int32 a, int32 b")?,
//! )?;
//! env.add_method("", Method::callback(add, |args| match args {
//!     [Value::Int32(a), Value::Int32(b)] => Ok(Value::Int32(a + b)),
//!     _ => Err(InvocationError::new("expected two int32")),
//! }))?;
//!
//! let server = RfuncServer::builder("127.0.0.1:0").build(env).await?;
//! let handle = server.start()?;
//!
//! let addr = handle.local_addr();
//! let mut client = Client::new(ClientConfig::new(addr.ip().to_string(), addr.port()))?;
//! client.initialize().await?;
//! let sum = client.invoke("add", &[Value::Int32(2), Value::Int32(3)]).await?;
//! assert_eq!(sum, Value::Int32(5));
//!
//! handle.terminate().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
pub mod logging;
mod server;

pub use client::Client;
pub use config::{ClientConfig, ServerConfig};
pub use error::RfuncError;
pub use server::{RfuncServer, RfuncServerBuilder, ServerHandle};

pub use rfunc_protocol::{
    ArgumentSpecification, MethodSpecification, NamespaceSpecification, PROTOCOL_VERSION, Value,
    ValueType,
};
pub use rfunc_registry::{Environment, InvocationError, Method, Namespace};

/// Everything needed to serve or call methods.
pub mod prelude {
    pub use crate::logging::{LogConfig, LogLevel};
    pub use crate::{
        ArgumentSpecification, Client, ClientConfig, Environment, InvocationError, Method,
        MethodSpecification, Namespace, NamespaceSpecification, PROTOCOL_VERSION, RfuncError,
        RfuncServer, RfuncServerBuilder, ServerConfig, ServerHandle, Value, ValueType,
    };
}
