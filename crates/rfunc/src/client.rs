//! The calling side: discover a server's methods, then invoke them.
//!
//! Every request runs over its own short-lived connection: connect,
//! handshake, one request, one reply, TERMINATE.

use rfunc_protocol::{
    ArgumentSpecification, MethodSpecification, NamespaceSpecification, Packet, PacketBody,
    Value,
};
use rfunc_registry::split_qualified;
use rfunc_transport::{Connection, TransportError};
use tokio::net::TcpStream;

use crate::{ClientConfig, RfuncError};

/// A client for one rfunc server.
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    namespaces: Vec<NamespaceSpecification>,
    initialized: bool,
}

impl Client {
    /// # Errors
    /// [`RfuncError::InvalidConfig`] for an empty host or port 0.
    pub fn new(config: ClientConfig) -> Result<Self, RfuncError> {
        config.validate()?;
        Ok(Self {
            config,
            namespaces: Vec::new(),
            initialized: false,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// What the server exposed at the last [`initialize`](Self::initialize).
    pub fn namespace_specifications(&self) -> &[NamespaceSpecification] {
        &self.namespaces
    }

    pub fn method_specifications(&self, namespace: &str) -> Option<&[MethodSpecification]> {
        self.namespace_spec(namespace).map(NamespaceSpecification::methods)
    }

    /// Fetches the server's namespaces and the methods in each, replacing
    /// anything cached before.
    pub async fn initialize(&mut self) -> Result<(), RfuncError> {
        self.namespaces.clear();
        self.initialized = false;

        let names = match self.request(PacketBody::NamespaceListRequest).await?.into_body() {
            PacketBody::NamespaceList(names) => names,
            other => return Err(unexpected("namespace list", &other)),
        };

        for name in names {
            let body = PacketBody::FunctionListRequest {
                namespace: name.clone(),
            };
            let methods = match self.request(body).await?.into_body() {
                PacketBody::FunctionList(methods) => methods,
                other => return Err(unexpected("function list", &other)),
            };
            tracing::debug!(namespace = %name, methods = methods.len(), "discovered namespace");
            self.namespaces
                .push(NamespaceSpecification::with_methods(name, methods));
        }

        self.initialized = true;
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            namespaces = self.namespaces.len(),
            "client initialized"
        );
        Ok(())
    }

    /// Calls `qualified_name` (`"ns.method"`, or `"method"` for the
    /// default namespace), checking it against the cache if the config
    /// says so.
    pub async fn invoke(&self, qualified_name: &str, values: &[Value]) -> Result<Value, RfuncError> {
        let (namespace, name) = split_qualified(qualified_name);
        self.invoke_with(namespace, name, values, self.config.affirm_validity)
            .await
    }

    pub async fn invoke_in(
        &self,
        namespace: &str,
        name: &str,
        values: &[Value],
    ) -> Result<Value, RfuncError> {
        self.invoke_with(namespace, name, values, self.config.affirm_validity)
            .await
    }

    /// Calls `namespace.name` with `values`.
    ///
    /// With `affirm_validity`, the call is checked against the discovered
    /// methods first and no connection is opened if it cannot succeed.
    ///
    /// # Errors
    /// - [`RfuncError::NotInitialized`], [`RfuncError::NoSuchNamespace`],
    ///   [`RfuncError::NoSuchMethod`] from the local check.
    /// - [`RfuncError::Remote`] if the server answered with an error.
    /// - Transport errors, including an unexpected reply type.
    pub async fn invoke_with(
        &self,
        namespace: &str,
        name: &str,
        values: &[Value],
        affirm_validity: bool,
    ) -> Result<Value, RfuncError> {
        let arguments = ArgumentSpecification::from_values(values);
        if affirm_validity {
            self.affirm(namespace, name, &arguments)?;
        }

        let call = PacketBody::FunctionCall {
            namespace: namespace.to_owned(),
            method: MethodSpecification::new(name, "", arguments)?,
            arguments: values.to_vec(),
        };
        match self.request(call).await?.into_body() {
            PacketBody::FunctionReturn(value) => Ok(value),
            PacketBody::Error(message) => Err(RfuncError::Remote(message)),
            other => Err(unexpected("function return", &other)),
        }
    }

    fn namespace_spec(&self, namespace: &str) -> Option<&NamespaceSpecification> {
        self.namespaces.iter().find(|ns| ns.name() == namespace)
    }

    fn affirm(
        &self,
        namespace: &str,
        name: &str,
        arguments: &ArgumentSpecification,
    ) -> Result<(), RfuncError> {
        if !self.initialized {
            return Err(RfuncError::NotInitialized);
        }
        let ns = self
            .namespace_spec(namespace)
            .ok_or_else(|| RfuncError::NoSuchNamespace(namespace.to_owned()))?;
        if ns.find(name, arguments).is_none() {
            return Err(RfuncError::NoSuchMethod {
                namespace: namespace.to_owned(),
                method: format!("{name}({arguments})"),
            });
        }
        Ok(())
    }

    async fn open(&self) -> Result<Connection<TcpStream>, RfuncError> {
        let addr = (self.config.host.as_str(), self.config.port);
        let mut conn = rfunc_transport::connect(addr, self.config.timeout())
            .await?
            .with_version(self.config.protocol_version.as_str());
        conn.shake_hands().await?;
        Ok(conn)
    }

    /// One request over a fresh connection.
    async fn request(&self, body: PacketBody) -> Result<Packet, RfuncError> {
        let mut conn = self.open().await?;
        let reply = conn.send_and_await_reply(body).await;
        if let Err(e) = conn.terminate().await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "terminate failed");
        }
        Ok(reply?)
    }
}

fn unexpected(expected: &'static str, actual: &PacketBody) -> RfuncError {
    TransportError::UnexpectedPacket {
        expected,
        actual: actual.packet_type(),
    }
    .into()
}
