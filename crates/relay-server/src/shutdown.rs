//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Cancelling the token stops the HTTP listener and every connection task;
//! each connection then closes its socket and leaves the registry. Upgraded
//! connections run outside the listener task, so they are counted on a
//! [`TaskTracker`] that [`ShutdownCoordinator::drain`] waits on.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// How long to wait for the listener and connections to drain.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates shutdown of the listener and all connection tasks.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the shutdown token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every task to stop.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Tracker for upgraded connection tasks.
    pub fn connections(&self) -> &TaskTracker {
        &self.connections
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then wait up to `timeout` for `handles` and every tracked
    /// connection to finish.
    ///
    /// Returns `false` if the wait timed out.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        let _ = self.connections.close();
        info!(
            tasks = handles.len(),
            connections = self.connections.len(),
            ?timeout,
            "draining relay tasks"
        );

        let all = async {
            let _ = futures::future::join_all(handles).await;
            self.connections.wait().await;
        };
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!(
                ?timeout,
                connections = self.connections.len(),
                "drain timed out, abandoning remaining tasks"
            );
            return false;
        }
        true
    }
}
