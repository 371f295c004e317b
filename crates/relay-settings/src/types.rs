//! Settings type definitions.
//!
//! JSON field names are camelCase. Every section is `#[serde(default)]`, so
//! a settings file only needs the keys it changes.

use std::time::Duration;

use relay_core::{LogFormat, RolePolicy};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 8443 },
///   "heartbeat": { "intervalMs": 15000, "timeoutMs": 45000 },
///   "relay": { "rolePolicy": "open" }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and transport limits.
    pub server: ServerSettings,
    /// Liveness probing.
    pub heartbeat: HeartbeatSettings,
    /// Routing behavior.
    pub relay: RoutingSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat.intervalMs must be greater than zero".into(),
            ));
        }
        if self.heartbeat.timeout_ms < self.heartbeat.interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeat.timeoutMs ({}) is shorter than heartbeat.intervalMs ({})",
                self.heartbeat.timeout_ms, self.heartbeat.interval_ms
            )));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be greater than zero".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Listener and transport limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` auto-assigns.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Maximum inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue depth.
    pub send_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 256,
            max_message_size: 1024 * 1024,
            send_queue_capacity: 256,
        }
    }
}

/// Liveness probing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// Ping interval in milliseconds.
    pub interval_ms: u64,
    /// Silence tolerated before a connection is force-closed, in milliseconds.
    /// Equal to `interval_ms` means one unanswered probe closes the connection.
    pub timeout_ms: u64,
}

impl HeartbeatSettings {
    /// Ping interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Liveness timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            timeout_ms: 30_000,
        }
    }
}

/// Routing behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingSettings {
    /// Which role strings `register` accepts.
    pub role_policy: RolePolicy,
    /// Send `registration-confirmed` after a successful `register`.
    pub confirm_registration: bool,
    /// Queue overflows tolerated before a stalled receiver is force-closed.
    pub max_dropped_messages: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            role_policy: RolePolicy::Closed,
            confirm_registration: true,
            max_dropped_messages: 64,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (e.g. `info`, `relay_server=debug`).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = RelaySettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 3000);
        assert_eq!(s.heartbeat.interval(), Duration::from_secs(30));
        assert_eq!(s.heartbeat.timeout(), Duration::from_secs(30));
        assert_eq!(s.relay.role_policy, RolePolicy::Closed);
        assert!(s.relay.confirm_registration);
        assert_eq!(s.logging.level, "info");
        assert!(s.validate().is_ok());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(json["server"].get("maxConnections").is_some());
        assert!(json["heartbeat"].get("intervalMs").is_some());
        assert!(json["relay"].get("rolePolicy").is_some());
        assert_eq!(json["relay"]["rolePolicy"], "closed");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: RelaySettings =
            serde_json::from_str(r#"{"heartbeat":{"intervalMs":5000}}"#).unwrap();
        assert_eq!(s.heartbeat.interval_ms, 5000);
        assert_eq!(s.heartbeat.timeout_ms, 30_000);
        assert_eq!(s.server.port, 3000);
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let mut s = RelaySettings::default();
        s.heartbeat.interval_ms = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn validate_rejects_timeout_below_interval() {
        let mut s = RelaySettings::default();
        s.heartbeat.interval_ms = 10_000;
        s.heartbeat.timeout_ms = 5_000;
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("timeoutMs"));
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut s = RelaySettings::default();
        s.server.send_queue_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_max_connections() {
        let mut s = RelaySettings::default();
        s.server.max_connections = 0;
        assert!(s.validate().is_err());
    }
}
