//! Server and client configuration.
//!
//! Both structs deserialize from any serde format; omitted fields take
//! the defaults documented on each field.

use std::time::Duration;

use rfunc_protocol::PROTOCOL_VERSION;
use serde::{Deserialize, Serialize};

use crate::RfuncError;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Configuration for an [`RfuncServer`](crate::RfuncServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on. Default: `127.0.0.1:0` (any free port).
    pub bind_addr: String,

    /// How long the accept loop waits for a connection, and how long a
    /// session waits for each packet, in milliseconds. The loop notices
    /// shutdown requests at this granularity. Default: 300.
    pub idle_timeout_ms: u64,

    /// Version announced in every handshake. Default: this crate's
    /// protocol version.
    pub protocol_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            idle_timeout_ms: 300,
            protocol_version: PROTOCOL_VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Shortest idle timeout the server accepts.
    pub const MIN_IDLE_TIMEOUT_MS: u64 = 1;

    /// Fixes out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.idle_timeout_ms < Self::MIN_IDLE_TIMEOUT_MS {
            tracing::warn!(
                idle_timeout_ms = self.idle_timeout_ms,
                min = Self::MIN_IDLE_TIMEOUT_MS,
                "idle_timeout_ms below minimum, clamping"
            );
            self.idle_timeout_ms = Self::MIN_IDLE_TIMEOUT_MS;
        }
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

fn default_timeout_ms() -> u64 {
    5000
}

fn default_affirm_validity() -> bool {
    true
}

fn default_protocol_version() -> String {
    PROTOCOL_VERSION.to_string()
}

/// Configuration for a [`Client`](crate::Client).
///
/// `host` and `port` are required; everything else has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,

    /// Must be in 1–65535.
    pub port: u16,

    /// Connect and per-read timeout in milliseconds. 0 disables it.
    /// Default: 5000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Check calls against the discovered methods before sending them.
    /// Default: true.
    #[serde(default = "default_affirm_validity")]
    pub affirm_validity: bool,

    /// Version announced in every handshake.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout_ms: default_timeout_ms(),
            affirm_validity: default_affirm_validity(),
            protocol_version: default_protocol_version(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_affirm_validity(mut self, affirm: bool) -> Self {
        self.affirm_validity = affirm;
        self
    }

    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// `None` when the timeout is disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// # Errors
    /// [`RfuncError::InvalidConfig`] for an empty host or port 0.
    pub fn validate(&self) -> Result<(), RfuncError> {
        if self.host.trim().is_empty() {
            return Err(RfuncError::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(RfuncError::InvalidConfig(
                "port must be between 1 and 65535".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.idle_timeout(), Duration::from_millis(300));
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
    }

    #[test]
    fn test_server_config_partial_json_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{ "bind_addr": "0.0.0.0:9000" }"#).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.idle_timeout_ms, 300);
    }

    #[test]
    fn test_server_config_validated_clamps_zero_timeout() {
        let config = ServerConfig {
            idle_timeout_ms: 0,
            ..ServerConfig::default()
        }
        .validated();
        assert_eq!(config.idle_timeout_ms, ServerConfig::MIN_IDLE_TIMEOUT_MS);
    }

    #[test]
    fn test_client_config_defaults_from_json() {
        let config: ClientConfig =
            serde_json::from_str(r#"{ "host": "example.org", "port": 4000 }"#).unwrap();
        assert_eq!(config, ClientConfig::new("example.org", 4000));
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
        assert!(config.affirm_validity);
    }

    #[test]
    fn test_client_config_requires_host_and_port() {
        assert!(serde_json::from_str::<ClientConfig>(r#"{ "port": 4000 }"#).is_err());
        assert!(serde_json::from_str::<ClientConfig>(r#"{ "host": "h", "port": 70000 }"#).is_err());
    }

    #[test]
    fn test_client_config_validation() {
        assert!(ClientConfig::new("localhost", 1).validate().is_ok());
        assert!(ClientConfig::new("localhost", 65535).validate().is_ok());
        assert!(matches!(
            ClientConfig::new("localhost", 0).validate(),
            Err(RfuncError::InvalidConfig(_))
        ));
        assert!(matches!(
            ClientConfig::new("  ", 80).validate(),
            Err(RfuncError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = ClientConfig::new("h", 1).with_timeout(Duration::ZERO);
        assert_eq!(config.timeout(), None);
    }
}
