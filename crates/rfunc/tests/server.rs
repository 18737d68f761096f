//! Integration tests for the server, the session handler and the client,
//! over real TCP sockets.

use std::time::Duration;

use rfunc::prelude::*;
use rfunc_protocol::PacketBody;
use rfunc_transport::TransportError;

// =========================================================================
// Helpers
// =========================================================================

fn spec(name: &str, args: &str) -> MethodSpecification {
    MethodSpecification::new(name, "", ArgumentSpecification::parse(args).unwrap()).unwrap()
}

fn environment() -> Environment {
    let mut env = Environment::new();
    env.add_method(
        "",
        Method::callback(spec("add", "int32 a, int32 b"), |args| match args {
            [Value::Int32(a), Value::Int32(b)] => Ok(Value::Int32(a.wrapping_add(*b))),
            _ => Err(InvocationError::new("add expects two int32")),
        }),
    )
    .unwrap();
    env.add_method(
        "math",
        Method::callback(spec("neg", "float64 x"), |args| match args {
            [Value::Float64(x)] => Ok(Value::Float64(-x)),
            _ => Err(InvocationError::new("neg expects one float64")),
        }),
    )
    .unwrap();
    env
}

/// Starts a server on a random port.
async fn start_server(idle_timeout: Duration) -> ServerHandle {
    RfuncServer::builder("127.0.0.1:0")
        .idle_timeout(idle_timeout)
        .build(environment())
        .await
        .expect("server should build")
        .start()
        .expect("server should start")
}

fn client_for(handle: &ServerHandle) -> Client {
    let addr = handle.local_addr();
    Client::new(ClientConfig::new(addr.ip().to_string(), addr.port())).expect("valid config")
}

async fn raw_connection(
    handle: &ServerHandle,
) -> rfunc_transport::Connection<tokio::net::TcpStream> {
    let mut conn = rfunc_transport::connect(handle.local_addr(), Some(Duration::from_secs(5)))
        .await
        .expect("should connect");
    conn.shake_hands().await.expect("handshake");
    conn
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_end_to_end_add() {
    let handle = start_server(Duration::from_millis(300)).await;
    let mut client = client_for(&handle);

    client.initialize().await.expect("discovery");
    assert!(client.is_initialized());
    let names: Vec<&str> = client
        .namespace_specifications()
        .iter()
        .map(|ns| ns.name())
        .collect();
    assert_eq!(names, vec!["", "math"]);
    assert_eq!(client.method_specifications("math").unwrap()[0].name(), "neg");

    let sum = client
        .invoke("add", &[Value::Int32(2), Value::Int32(3)])
        .await
        .expect("add should succeed");
    assert_eq!(sum, Value::Int32(5));

    let neg = client
        .invoke("math.neg", &[Value::Float64(1.5)])
        .await
        .expect("neg should succeed");
    assert_eq!(neg, Value::Float64(-1.5));

    handle.terminate().await.unwrap();
}

#[tokio::test]
async fn test_checked_call_fails_locally() {
    let handle = start_server(Duration::from_millis(300)).await;
    let mut client = client_for(&handle);
    client.initialize().await.unwrap();

    // With the server gone, any attempt to connect would fail with a
    // transport error; the checks must answer first.
    handle.terminate().await.unwrap();

    let err = client
        .invoke("add", &[Value::Int64(2), Value::Int64(3)])
        .await
        .unwrap_err();
    assert!(matches!(err, RfuncError::NoSuchMethod { .. }), "{err:?}");

    let err = client.invoke("nope.add", &[]).await.unwrap_err();
    assert!(matches!(err, RfuncError::NoSuchNamespace(ref ns) if ns == "nope"));
}

#[tokio::test]
async fn test_unchecked_call_reports_remote_error() {
    let handle = start_server(Duration::from_millis(300)).await;
    let client = client_for(&handle);

    let err = client
        .invoke_with("", "add", &[Value::Int64(2)], false)
        .await
        .unwrap_err();
    match err {
        RfuncError::Remote(message) => {
            assert!(message.starts_with("invocation error: "), "{message}");
        }
        other => panic!("expected remote error, got {other:?}"),
    }

    handle.terminate().await.unwrap();
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let handle = start_server(Duration::from_millis(300)).await;
    let addr = handle.local_addr();
    let config = ClientConfig::new(addr.ip().to_string(), addr.port())
        .with_protocol_version("0.0.0-incompatible");
    let mut client = Client::new(config).unwrap();

    let err = client.initialize().await.unwrap_err();
    assert!(
        matches!(
            err,
            RfuncError::Transport(TransportError::VersionMismatch { .. })
        ),
        "{err:?}"
    );
    assert!(!client.is_initialized());

    handle.terminate().await.unwrap();
}

#[tokio::test]
async fn test_one_session_at_a_time() {
    let handle = start_server(Duration::from_secs(2)).await;

    let mut first = raw_connection(&handle).await;

    let addr = handle.local_addr();
    let second = tokio::spawn(async move {
        let mut conn = rfunc_transport::connect(addr, Some(Duration::from_secs(5)))
            .await
            .expect("should connect");
        conn.shake_hands().await.map(|()| conn)
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        !second.is_finished(),
        "second handshake completed while the first session was open"
    );

    first.terminate().await.unwrap();
    let mut second = second.await.unwrap().expect("second handshake");
    let reply = second
        .send_and_await_reply(PacketBody::NamespaceListRequest)
        .await
        .unwrap();
    assert_eq!(
        reply.into_body(),
        PacketBody::NamespaceList(vec!["".into(), "math".into()])
    );
    second.terminate().await.unwrap();

    handle.terminate().await.unwrap();
}

#[tokio::test]
async fn test_replies_echo_transaction_ids() {
    let handle = start_server(Duration::from_millis(300)).await;
    let mut conn = raw_connection(&handle).await;

    for expected in 0..3 {
        let reply = conn
            .send_and_await_reply(PacketBody::FunctionListRequest {
                namespace: "missing".into(),
            })
            .await
            .unwrap();
        assert_eq!(reply.transaction_id(), Some(expected));
        assert_eq!(reply.into_body(), PacketBody::FunctionList(vec![]));
    }
    conn.terminate().await.unwrap();

    handle.terminate().await.unwrap();
}

#[tokio::test]
async fn test_server_rejects_reply_packets_and_keeps_serving() {
    let handle = start_server(Duration::from_millis(300)).await;
    let mut conn = raw_connection(&handle).await;

    let reply = conn
        .send_and_await_reply(PacketBody::FunctionReturn(Value::Bool(true)))
        .await
        .unwrap();
    assert_eq!(
        reply.into_body(),
        PacketBody::Error("server cannot process packet of type 'ret'".into())
    );

    let reply = conn
        .send_and_await_reply(PacketBody::NamespaceListRequest)
        .await
        .unwrap();
    assert!(matches!(reply.into_body(), PacketBody::NamespaceList(_)));
    conn.terminate().await.unwrap();

    handle.terminate().await.unwrap();
}

#[tokio::test]
async fn test_terminate_returns_environment() {
    let handle = start_server(Duration::from_millis(50)).await;
    assert!(!handle.terminate_requested());
    assert!(!handle.is_terminated());

    let env = handle.terminate().await.expect("clean shutdown");
    assert_eq!(env.namespace_names(), vec!["", "math"]);
    assert!(
        env.default_namespace()
            .contains("add", &ArgumentSpecification::parse("int32, int32").unwrap())
    );
}

#[tokio::test]
async fn test_stalled_session_times_out_and_server_recovers() {
    let handle = start_server(Duration::from_millis(100)).await;

    // Handshake, then go quiet past the server's idle timeout.
    let mut stalled = raw_connection(&handle).await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    let err = stalled.await_packet().await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed), "{err:?}");

    let mut client = client_for(&handle);
    client.initialize().await.expect("server still serves");

    handle.terminate().await.unwrap();
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_server() {
    let mut env = environment();
    env.add_method(
        "",
        Method::callback(spec("boom", ""), |_| panic!("handler bug")),
    )
    .unwrap();
    let handle = RfuncServer::builder("127.0.0.1:0")
        .idle_timeout(Duration::from_millis(300))
        .build(env)
        .await
        .unwrap()
        .start()
        .unwrap();
    let mut client = client_for(&handle);
    client.initialize().await.unwrap();

    let err = client.invoke("boom", &[]).await.unwrap_err();
    match err {
        RfuncError::Remote(message) => {
            assert_eq!(message, "invocation error: handler panicked: handler bug");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(!handle.is_terminated());

    client.initialize().await.expect("server still serves");
    let sum = client
        .invoke("add", &[Value::Int32(1), Value::Int32(1)])
        .await
        .unwrap();
    assert_eq!(sum, Value::Int32(2));

    let env = handle.terminate().await.expect("clean shutdown");
    assert!(env.default_namespace().contains("boom", &ArgumentSpecification::NONE));
}
