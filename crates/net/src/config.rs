//! Network configuration and logging setup

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::protocol::PROTOCOL_VERSION;

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetConfig {
    /// Bind address for the host, connect address for clients
    pub host: String,
    pub port: u16,
    pub protocol_version: String,
    /// Upper bound on TCP connect + accept/reject reply
    pub connect_timeout_ms: u64,
    /// How long the host waits for a new connection's hello
    pub handshake_timeout_ms: u64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7788,
            protocol_version: PROTOCOL_VERSION.to_string(),
            connect_timeout_ms: 3000,
            handshake_timeout_ms: 2000,
        }
    }
}

impl NetConfig {
    /// Create from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        use std::env;

        let defaults = Self::default();

        let host = env::var("TETRIS_BATTLE_HOST").unwrap_or(defaults.host);
        let port = env::var("TETRIS_BATTLE_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);
        let connect_timeout_ms = env::var("TETRIS_BATTLE_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.connect_timeout_ms);
        let handshake_timeout_ms = env::var("TETRIS_BATTLE_HANDSHAKE_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.handshake_timeout_ms);
        let protocol_version = env::var("TETRIS_BATTLE_PROTOCOL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.protocol_version);

        Self {
            host,
            port,
            protocol_version,
            connect_timeout_ms,
            handshake_timeout_ms,
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Install the global `tracing` subscriber (`RUST_LOG`, default `info`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
