//! Per-connection session handling: handshake, then request/reply until
//! the client terminates.
//!
//! The flow is:
//!   1. Exchange HANDSHAKE packets and check versions
//!   2. Loop: await a packet, dispatch it against the environment, reply
//!   3. Stop on TERMINATE (no reply) or on the first channel error

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use rfunc_protocol::{Packet, PacketBody};
use rfunc_registry::Environment;
use rfunc_transport::{Connection, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};

/// Serves one connection from handshake to close.
///
/// The connection is always closed on return.
pub(crate) async fn handle_connection<S>(
    mut conn: Connection<S>,
    environment: &Environment,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let result = serve_session(&mut conn, environment).await;
    if let Err(e) = conn.close().await {
        tracing::trace!(conn_id = %conn.id(), error = %e, "close failed");
    }
    result
}

async fn serve_session<S>(
    conn: &mut Connection<S>,
    environment: &Environment,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let conn_id = conn.id();

    // --- Step 1: Handshake ---
    conn.shake_hands().await?;
    tracing::info!(%conn_id, "session started");

    // --- Step 2: Request loop ---
    loop {
        let request = conn.await_packet().await?;
        match dispatch(environment, &request).await {
            Some(reply) => conn.reply(&request, reply).await?,
            None => {
                tracing::info!(%conn_id, "session terminated by client");
                return Ok(());
            }
        }
    }
}

/// Decides the reply to one request. `None` means the request was
/// TERMINATE and nothing is sent back.
pub(crate) async fn dispatch(environment: &Environment, request: &Packet) -> Option<PacketBody> {
    let reply = match request.body() {
        PacketBody::FunctionCall {
            namespace,
            method,
            arguments,
        } => {
            let call = environment.invoke_spec(namespace, method, arguments);
            match AssertUnwindSafe(call).catch_unwind().await {
                Ok(Ok(value)) => {
                    tracing::debug!(%namespace, %method, "call returned");
                    PacketBody::FunctionReturn(value)
                }
                Ok(Err(e)) => {
                    tracing::debug!(%namespace, %method, error = %e, "call failed");
                    PacketBody::Error(format!("invocation error: {e}"))
                }
                Err(payload) => {
                    let reason = panic_message(&*payload);
                    tracing::error!(%namespace, %method, %reason, "handler panicked");
                    PacketBody::Error(format!("invocation error: handler panicked: {reason}"))
                }
            }
        }
        PacketBody::NamespaceListRequest => {
            tracing::debug!("listing namespaces");
            PacketBody::NamespaceList(environment.namespace_names())
        }
        PacketBody::FunctionListRequest { namespace } => {
            tracing::debug!(%namespace, "listing methods");
            let methods = environment
                .namespace(namespace)
                .map(|ns| ns.list())
                .unwrap_or_default();
            PacketBody::FunctionList(methods)
        }
        PacketBody::Terminate => return None,
        other => {
            let packet_type = other.packet_type();
            tracing::warn!(%packet_type, "cannot process packet");
            PacketBody::Error(format!(
                "server cannot process packet of type '{packet_type}'"
            ))
        }
    };
    Some(reply)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use rfunc_protocol::{ArgumentSpecification, MethodSpecification, Value};
    use rfunc_registry::{InvocationError, Method};

    use super::*;

    fn environment() -> Environment {
        let mut env = Environment::new();
        let spec = MethodSpecification::new(
            "add",
            "",
            ArgumentSpecification::parse("int32 a, int32 b").unwrap(),
        )
        .unwrap();
        env.add_method(
            "math",
            Method::callback(spec, |args| match args {
                [Value::Int32(a), Value::Int32(b)] => Ok(Value::Int32(a + b)),
                _ => Err(InvocationError::new("bad arguments")),
            }),
        )
        .unwrap();
        env
    }

    fn request(body: PacketBody) -> Packet {
        Packet::new(body).with_transaction_id(0)
    }

    #[tokio::test]
    async fn test_function_call_returns_value() {
        let env = environment();
        let call = PacketBody::FunctionCall {
            namespace: "math".into(),
            method: MethodSpecification::new(
                "add",
                "",
                ArgumentSpecification::from_values(&[Value::Int32(1), Value::Int32(2)]),
            )
            .unwrap(),
            arguments: vec![Value::Int32(1), Value::Int32(2)],
        };
        assert_eq!(
            dispatch(&env, &request(call)).await,
            Some(PacketBody::FunctionReturn(Value::Int32(3)))
        );
    }

    #[tokio::test]
    async fn test_unknown_method_is_invocation_error() {
        let env = environment();
        let call = PacketBody::FunctionCall {
            namespace: "math".into(),
            method: MethodSpecification::new("sub", "", ArgumentSpecification::NONE).unwrap(),
            arguments: vec![],
        };
        let Some(PacketBody::Error(message)) = dispatch(&env, &request(call)).await else {
            panic!("expected an error reply");
        };
        assert!(message.starts_with("invocation error: "), "{message}");
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_error_reply() {
        let mut env = environment();
        env.add_method(
            "",
            Method::callback(
                MethodSpecification::new("boom", "", ArgumentSpecification::NONE).unwrap(),
                |_| panic!("handler bug"),
            ),
        )
        .unwrap();
        let call = PacketBody::FunctionCall {
            namespace: String::new(),
            method: MethodSpecification::new("boom", "", ArgumentSpecification::NONE).unwrap(),
            arguments: vec![],
        };
        assert_eq!(
            dispatch(&env, &request(call)).await,
            Some(PacketBody::Error(
                "invocation error: handler panicked: handler bug".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_namespace_list_starts_with_default() {
        let env = environment();
        assert_eq!(
            dispatch(&env, &request(PacketBody::NamespaceListRequest)).await,
            Some(PacketBody::NamespaceList(vec!["".into(), "math".into()]))
        );
    }

    #[tokio::test]
    async fn test_unknown_namespace_lists_no_methods() {
        let env = environment();
        let body = PacketBody::FunctionListRequest {
            namespace: "nope".into(),
        };
        assert_eq!(
            dispatch(&env, &request(body)).await,
            Some(PacketBody::FunctionList(vec![]))
        );
    }

    #[tokio::test]
    async fn test_terminate_gets_no_reply() {
        let env = environment();
        assert_eq!(dispatch(&env, &request(PacketBody::Terminate)).await, None);
    }

    #[tokio::test]
    async fn test_reply_types_are_rejected() {
        let env = environment();
        let reply = dispatch(&env, &request(PacketBody::FunctionReturn(Value::Int8(1)))).await;
        assert_eq!(
            reply,
            Some(PacketBody::Error(
                "server cannot process packet of type 'ret'".into()
            ))
        );
    }
}
