//! Invocable methods: a signature paired with a handler.
//!
//! A handler takes an ordered argument list and produces one [`Value`]
//! or fails. There are exactly two kinds: an in-process callback and an
//! external program whose exit code becomes the result.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use rfunc_protocol::{MethodSpecification, Value, ValueType};
use tokio::process::Command;

use crate::{InvocationError, RegistryError};

/// Result returned when the external program could not be started.
pub const SPAWN_FAILED_EXIT_CODE: i32 = -1;

/// Result returned when waiting on the program failed, or it ended
/// without an exit code (killed by a signal).
pub const NO_EXIT_CODE: i32 = -2;

/// An in-process handler.
pub type Callback = Arc<dyn Fn(&[Value]) -> Result<Value, InvocationError> + Send + Sync>;

/// How a [`Method`] is carried out.
#[derive(Clone)]
pub enum Handler {
    /// Calls a closure in this process.
    Callback(Callback),
    /// Runs a program with the arguments' text forms as argv and returns
    /// its exit code as `int32`.
    Process(PathBuf),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Callback(_) => f.write_str("Callback(..)"),
            Handler::Process(program) => f.debug_tuple("Process").field(program).finish(),
        }
    }
}

/// A registered, callable method.
#[derive(Debug, Clone)]
pub struct Method {
    spec: MethodSpecification,
    handler: Handler,
}

impl Method {
    /// Wraps an in-process closure.
    ///
    /// ```
    /// use rfunc_protocol::{ArgumentSpecification, MethodSpecification, Value};
    /// use rfunc_registry::{InvocationError, Method};
    ///
    /// let spec = MethodSpecification::new(
    ///     "negate",
    ///     "flips the sign",
    ///     ArgumentSpecification::parse("int32 x").unwrap(),
    /// )
    /// .unwrap();
    /// let method = Method::callback(spec, |args| match args {
    ///     [Value::Int32(x)] => Ok(Value::Int32(-x)),
    ///     _ => Err(InvocationError::new("expected one int32")),
    /// });
    /// assert_eq!(method.spec().name(), "negate");
    /// ```
    pub fn callback<F>(spec: MethodSpecification, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, InvocationError> + Send + Sync + 'static,
    {
        Self {
            spec,
            handler: Handler::Callback(Arc::new(f)),
        }
    }

    /// Wraps an external program.
    ///
    /// # Errors
    /// [`RegistryError::InvalidHandler`] unless every declared argument is
    /// a `string`.
    pub fn process(
        spec: MethodSpecification,
        program: impl Into<PathBuf>,
    ) -> Result<Self, RegistryError> {
        if !spec.arguments().is_all_of_type(ValueType::String) {
            return Err(RegistryError::InvalidHandler(format!(
                "process handlers take only string arguments, {spec} does not"
            )));
        }
        Ok(Self {
            spec,
            handler: Handler::Process(program.into()),
        })
    }

    pub fn spec(&self) -> &MethodSpecification {
        &self.spec
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Runs the handler.
    ///
    /// Process handlers never fail; problems starting or reaping the
    /// program are reported through the exit code.
    pub async fn invoke(&self, values: &[Value]) -> Result<Value, InvocationError> {
        match &self.handler {
            Handler::Callback(f) => f(values),
            Handler::Process(program) => Ok(Value::Int32(run_program(program, values).await)),
        }
    }
}

async fn run_program(program: &Path, values: &[Value]) -> i32 {
    let mut child = match Command::new(program)
        .args(values.iter().map(Value::to_string))
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program = %program.display(), error = %e, "failed to start process");
            return SPAWN_FAILED_EXIT_CODE;
        }
    };

    match child.wait().await {
        Ok(status) => status.code().unwrap_or_else(|| {
            tracing::warn!(program = %program.display(), %status, "process ended without an exit code");
            NO_EXIT_CODE
        }),
        Err(e) => {
            tracing::warn!(program = %program.display(), error = %e, "failed to wait for process");
            NO_EXIT_CODE
        }
    }
}

#[cfg(test)]
mod tests {
    use rfunc_protocol::ArgumentSpecification;

    use super::*;

    fn spec(args: &str) -> MethodSpecification {
        MethodSpecification::new("m", "", ArgumentSpecification::parse(args).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_callback_receives_arguments() {
        let method = Method::callback(spec("int32 a, int32 b"), |args| match args {
            [Value::Int32(a), Value::Int32(b)] => Ok(Value::Int32(a + b)),
            _ => Err(InvocationError::new("bad arguments")),
        });
        let result = method.invoke(&[Value::Int32(2), Value::Int32(3)]).await;
        assert_eq!(result, Ok(Value::Int32(5)));
    }

    #[tokio::test]
    async fn test_callback_error_is_returned() {
        let method = Method::callback(spec(""), |_| Err(InvocationError::new("nope")));
        let err = method.invoke(&[]).await.unwrap_err();
        assert_eq!(err.message(), "nope");
    }

    #[test]
    fn test_process_requires_string_arguments() {
        let err = Method::process(spec("string a, int32 b"), "/bin/true").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidHandler(_)));
        assert!(Method::process(spec("string a"), "/bin/true").is_ok());
        assert!(Method::process(spec(""), "/bin/true").is_ok());
    }

    #[tokio::test]
    async fn test_missing_program_maps_to_spawn_failure() {
        let method = Method::process(spec(""), "/definitely/not/a/program").unwrap();
        assert_eq!(
            method.invoke(&[]).await,
            Ok(Value::Int32(SPAWN_FAILED_EXIT_CODE))
        );
    }

    #[test]
    fn test_handler_debug_hides_closure() {
        let method = Method::callback(spec(""), |_| Ok(Value::Bool(true)));
        assert_eq!(format!("{:?}", method.handler()), "Callback(..)");
    }
}
