//! Per-connection state.
//!
//! A [`ClientConnection`] is owned by its socket task (see `socket`). The
//! [`RoleRegistry`] only holds a `Weak` reference, so teardown never depends
//! on registry cleanup succeeding first.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::{ConnectionId, OutboundFrame, RegistrationError, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::registry::RoleRegistry;

/// An item on a connection's outbound queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame. Shared so fan-out encodes once.
    Text(Arc<String>),
    /// A heartbeat probe.
    Ping,
}

/// Lifecycle of a connection: `Unregistered → Registered → Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no `register` frame yet.
    Unregistered,
    /// Holds a role and is addressable.
    Registered,
    /// Terminal. Nothing more is sent or processed.
    Closed,
}

/// Why a frame could not be queued for a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The outbound queue is full; the receiver is not keeping up.
    #[error("outbound queue full")]
    Full,
    /// The writer task is gone; the transport has failed.
    #[error("transport disconnected")]
    Disconnected,
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
}

/// A connected WebSocket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Set exactly once by the first successful `register`.
    role: OnceLock<Role>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Outbound>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last pong (or any inbound frame) was received.
    last_seen: Mutex<Instant>,
    /// Count of messages dropped due to a full queue.
    dropped_messages: AtomicU64,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl ClientConnection {
    /// Create a new, unregistered connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Outbound>) -> Self {
        let now = Instant::now();
        Self {
            id,
            role: OnceLock::new(),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// The registered role, if any.
    pub fn role(&self) -> Option<&Role> {
        self.role.get()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::SeqCst) {
            ConnectionState::Closed
        } else if self.role.get().is_some() {
            ConnectionState::Registered
        } else {
            ConnectionState::Unregistered
        }
    }

    /// Whether the connection has not been closed.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Assign this connection's role and insert it into the registry.
    ///
    /// Roles are assigned once: a second `register` fails with
    /// [`RegistrationError::AlreadyRegistered`] and leaves the first role in
    /// place.
    pub fn register(
        self: &Arc<Self>,
        role: Role,
        registry: &RoleRegistry,
    ) -> Result<(), RegistrationError> {
        if !self.is_open() {
            return Err(RegistrationError::ConnectionClosed);
        }
        if let Some(current) = self.role.get() {
            return Err(RegistrationError::AlreadyRegistered {
                current: current.clone(),
            });
        }
        if let Err(rejected) = self.role.set(role.clone()) {
            let current = self.role.get().cloned().unwrap_or(rejected);
            return Err(RegistrationError::AlreadyRegistered { current });
        }

        let _ = registry.insert(role, self);

        // A close that raced the insert may have run its removal first.
        if !self.is_open() {
            let _ = registry.remove(&self.id);
            return Err(RegistrationError::ConnectionClosed);
        }
        Ok(())
    }

    /// Queue a text frame for the client without waiting.
    pub fn send(&self, message: Arc<String>) -> Result<(), SendError> {
        if !self.is_open() {
            debug!(conn_id = %self.id, "send on closed connection, dropping");
            return Err(SendError::Closed);
        }
        match self.tx.try_send(Outbound::Text(message)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SendError::Disconnected),
        }
    }

    /// Encode and queue an outbound frame.
    pub fn send_frame(&self, frame: &OutboundFrame) -> Result<(), SendError> {
        match frame.encode() {
            Ok(json) => self.send(Arc::new(json)),
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to encode outbound frame");
                Err(SendError::Closed)
            }
        }
    }

    /// Queue a heartbeat ping. Returns `false` if it could not be queued.
    pub fn ping(&self) -> bool {
        self.is_open() && self.tx.try_send(Outbound::Ping).is_ok()
    }

    /// Record inbound activity (pong or any frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection showed activity since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong or inbound frame.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Token cancelled when the connection closes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Close the connection: mark it dead, remove it from the registry, and
    /// signal its tasks to stop.
    ///
    /// Idempotent. Returns `true` only for the call that performed the
    /// transition; registry removal runs on every call.
    pub fn close(&self, registry: &RoleRegistry) -> bool {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        let _ = registry.remove(&self.id);
        if first {
            self.cancel.cancel();
        }
        first
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("role", &self.role.get())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
