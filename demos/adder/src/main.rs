//! Serves a tiny calculator over rfunc, then calls it through a client.

use rfunc::prelude::*;

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

fn signature(name: &str, description: &str, args: &str) -> Result<MethodSpecification, RfuncError> {
    Ok(MethodSpecification::new(
        name,
        description,
        ArgumentSpecification::parse(args)?,
    )?)
}

fn calculator() -> Result<Environment, RfuncError> {
    let mut env = Environment::new();

    env.add_method(
        "",
        Method::callback(signature("add", "adds two integers", "int32 a, int32 b")?, |args| {
            match args {
                [Value::Int32(a), Value::Int32(b)] => a
                    .checked_add(*b)
                    .map(Value::Int32)
                    .ok_or_else(|| InvocationError::new("int32 overflow")),
                _ => Err(InvocationError::new("add expects two int32")),
            }
        }),
    )?;

    // Same name, different signature.
    env.add_method(
        "",
        Method::callback(signature("add", "adds two floats", "float64 a, float64 b")?, |args| {
            match args {
                [Value::Float64(a), Value::Float64(b)] => Ok(Value::Float64(a + b)),
                _ => Err(InvocationError::new("add expects two float64")),
            }
        }),
    )?;

    env.add_method(
        "text",
        Method::callback(signature("concat", "joins two strings", "string, string")?, |args| {
            match args {
                [Value::String(a), Value::String(b)] => Ok(Value::String(format!("{a}{b}"))),
                _ => Err(InvocationError::new("concat expects two strings")),
            }
        }),
    )?;

    Ok(env)
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), RfuncError> {
    rfunc::logging::init(&LogConfig::default())?;

    let handle = RfuncServer::builder("127.0.0.1:0")
        .build(calculator()?)
        .await?
        .start()?;
    let addr = handle.local_addr();
    tracing::info!(%addr, "calculator listening");

    let mut client = Client::new(ClientConfig::new(addr.ip().to_string(), addr.port()))?;
    client.initialize().await?;
    for ns in client.namespace_specifications() {
        for method in ns.methods() {
            tracing::info!(namespace = %ns.name(), %method, "available");
        }
    }

    let sum = client.invoke("add", &[Value::Int32(2), Value::Int32(3)]).await?;
    tracing::info!(%sum, "add(2, 3)");

    let sum = client
        .invoke("add", &[Value::Float64(0.5), Value::Float64(0.25)])
        .await?;
    tracing::info!(%sum, "add(0.5, 0.25)");

    let joined = client
        .invoke(
            "text.concat",
            &[Value::String("r".into()), Value::String("func".into())],
        )
        .await?;
    tracing::info!(%joined, "text.concat");

    if let Err(e) = client.invoke("add", &[Value::Int32(i32::MAX), Value::Int32(1)]).await {
        tracing::warn!(error = %e, "overflow reported by the server");
    }

    handle.terminate().await?;
    Ok(())
}
