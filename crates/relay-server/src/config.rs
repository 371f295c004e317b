//! Server configuration.

use std::time::Duration;

use relay_core::RolePolicy;
use relay_settings::RelaySettings;

/// Runtime configuration for the relay server.
///
/// Built from [`RelaySettings`] by the binary; tests construct it directly.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated before a connection is closed.
    pub heartbeat_timeout: Duration,
    /// Which role strings `register` accepts.
    pub role_policy: RolePolicy,
    /// Send `registration-confirmed` after a successful `register`.
    pub confirm_registration: bool,
    /// Queue overflows tolerated before a stalled receiver is closed.
    pub max_dropped_messages: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = RelaySettings::default();
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            ..Self::from(&settings)
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            max_message_size: settings.server.max_message_size,
            send_queue_capacity: settings.server.send_queue_capacity,
            heartbeat_interval: settings.heartbeat.interval(),
            heartbeat_timeout: settings.heartbeat.timeout(),
            role_policy: settings.relay.role_policy,
            confirm_registration: settings.relay.confirm_registration,
            max_dropped_messages: settings.relay.max_dropped_messages,
        }
    }
}

impl ServerConfig {
    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
