//! Server-side method registry for rfunc.
//!
//! - [`Method`]: a [`MethodSpecification`](rfunc_protocol::MethodSpecification)
//!   paired with a [`Handler`].
//! - [`Namespace`]: a group of overloadable methods.
//! - [`Environment`]: every namespace a server exposes, with dispatch by
//!   qualified name or by exact specification.

mod environment;
mod error;
mod method;
mod namespace;

pub use environment::{DEFAULT_NAMESPACE, Environment, split_qualified};
pub use error::{InvocationError, RegistryError};
pub use method::{Callback, Handler, Method, NO_EXIT_CODE, SPAWN_FAILED_EXIT_CODE};
pub use namespace::Namespace;
