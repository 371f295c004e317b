//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use relay_core::Role;
use tracing::info;

use crate::error::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a global recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Bounded label value for a role. Open-policy rooms collapse to `custom`.
pub fn role_label(role: &Role) -> &'static str {
    match role {
        Role::Guest => "guest",
        Role::Studio => "studio",
        Role::Custom(_) => "custom",
    }
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// Frames dropped on a full outbound queue (counter).
pub const WS_SEND_DROPS_TOTAL: &str = "ws_send_drops_total";
/// Successful registrations (counter, labels: role).
pub const RELAY_REGISTRATIONS_TOTAL: &str = "relay_registrations_total";
/// Signal frames delivered, one per recipient (counter, labels: target).
pub const RELAY_SIGNALS_FORWARDED_TOTAL: &str = "relay_signals_forwarded_total";
/// Signal frames with no live recipient (counter, labels: target).
pub const RELAY_SIGNALS_DEAD_LETTER_TOTAL: &str = "relay_signals_dead_letter_total";
/// Inbound frames rejected (counter, labels: reason).
pub const RELAY_FRAMES_REJECTED_TOTAL: &str = "relay_frames_rejected_total";
/// Connections closed by the liveness monitor (counter).
pub const RELAY_HEARTBEAT_TIMEOUTS_TOTAL: &str = "relay_heartbeat_timeouts_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn role_labels_are_bounded() {
        assert_eq!(role_label(&Role::Guest), "guest");
        assert_eq!(role_label(&Role::Studio), "studio");
        assert_eq!(role_label(&Role::Custom("room-42".into())), "custom");
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTIONS_REJECTED_TOTAL,
            WS_SEND_DROPS_TOTAL,
            RELAY_REGISTRATIONS_TOTAL,
            RELAY_SIGNALS_FORWARDED_TOTAL,
            RELAY_SIGNALS_DEAD_LETTER_TOTAL,
            RELAY_FRAMES_REJECTED_TOTAL,
            RELAY_HEARTBEAT_TIMEOUTS_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
