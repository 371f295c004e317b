//! Shared relay state handed to every connection task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use metrics::counter;
use relay_core::RolePolicy;
use tracing::warn;

use super::connection::{ClientConnection, SendError};
use super::registry::RoleRegistry;
use crate::config::ServerConfig;
use crate::metrics::WS_SEND_DROPS_TOTAL;

/// Routing state and policy shared by all connections.
pub struct RelayContext {
    /// Role → connection-set map.
    pub registry: Arc<RoleRegistry>,
    /// Which role strings `register` accepts.
    pub role_policy: RolePolicy,
    /// Send `registration-confirmed` on success.
    pub confirm_registration: bool,
    /// Overflows tolerated before a stalled receiver is closed.
    pub max_dropped_messages: u64,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Ping interval.
    pub heartbeat_interval: Duration,
    /// Liveness timeout.
    pub heartbeat_timeout: Duration,
    active: Arc<AtomicUsize>,
}

impl RelayContext {
    /// Build from server configuration with an empty registry.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: Arc::new(RoleRegistry::new()),
            role_policy: config.role_policy,
            confirm_registration: config.confirm_registration,
            max_dropped_messages: config.max_dropped_messages,
            send_queue_capacity: config.send_queue_capacity,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.heartbeat_timeout,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Open WebSocket connections, registered or not.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reserve a connection slot if fewer than `max` are in use.
    ///
    /// The slot is released when the returned guard drops.
    pub fn try_acquire_slot(&self, max: usize) -> Option<ConnectionSlot> {
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| ConnectionSlot {
                active: Arc::clone(&self.active),
            })
    }

    /// React to a failed delivery to `peer`.
    ///
    /// A vanished writer closes the peer at once. A full queue is tolerated
    /// until the peer has dropped `max_dropped_messages` frames.
    pub fn handle_send_failure(&self, peer: &ClientConnection, err: SendError) {
        match err {
            SendError::Disconnected => {
                warn!(conn_id = %peer.id, "receiver transport gone, closing");
                let _ = peer.close(&self.registry);
            }
            SendError::Full => {
                counter!(WS_SEND_DROPS_TOTAL).increment(1);
                let drops = peer.drop_count();
                if drops >= self.max_dropped_messages {
                    warn!(conn_id = %peer.id, drops, "receiver stalled, disconnecting");
                    let _ = peer.close(&self.registry);
                } else {
                    warn!(conn_id = %peer.id, drops, "receiver queue full, frame dropped");
                }
            }
            SendError::Closed => {}
        }
    }
}

/// A reserved connection slot. Dropping it frees the slot.
#[derive(Debug)]
pub struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
    }
}
