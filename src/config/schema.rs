//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML, and every
//! field has a default so a minimal (or empty) file is valid.

use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

/// Default number of handshakes allowed to run at once.
pub const DEFAULT_MAX_HANDSHAKES: usize = 1000;

/// Default deadline for each handshake read.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest token pool a listener accepts.
pub fn max_handshakes_limit() -> usize {
    Semaphore::MAX_PERMITS.min(u32::MAX as usize)
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address, capacity, deadline).
    pub listener: ListenerConfig,

    /// Where the long-term identity key lives.
    pub identity: IdentityConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// TCP port. 0 picks an ephemeral port.
    pub port: u16,

    /// Maximum concurrent handshakes (token pool capacity).
    pub max_handshakes: usize,

    /// Deadline for each of the two handshake reads, in milliseconds.
    pub handshake_timeout_ms: u64,
}

impl ListenerConfig {
    /// Defaults, bound to all interfaces on `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.bind_host.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 2448,
            max_handshakes: DEFAULT_MAX_HANDSHAKES,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Identity key location.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Path to a hex-encoded secret key. A fresh key is generated when unset.
    pub key_path: Option<String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    pub log_format: LogFormat,

    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,

    /// Address for the metrics endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "handshake_gate=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
