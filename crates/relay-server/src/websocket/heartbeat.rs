//! Liveness monitor: periodic ping, close on silence.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Number of consecutive silent intervals tolerated before timing out.
///
/// `timeout / interval`, at least 1. With `timeout == interval` a single
/// unanswered probe is fatal.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}

/// Probe a connection until it goes silent or `cancel` fires.
///
/// A probe is queued at start and on every `interval` tick. Each tick first
/// checks and clears the alive flag (set by any pong or inbound frame). After
/// `max_missed` consecutive ticks without activity, returns
/// [`HeartbeatResult::TimedOut`]; the caller closes the connection.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let max_missed = max_missed(interval, timeout);
    let mut missed: u32 = 0;

    // First probe goes out immediately and must be answered by the first tick.
    let _ = connection.check_alive();
    let _ = connection.ping();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    trace!(conn_id = %connection.id, missed, max_missed, "no activity since last probe");
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
                if !connection.ping() {
                    trace!(conn_id = %connection.id, "ping not queued");
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Outbound;
    use relay_core::ConnectionId;
    use tokio::sync::mpsc;

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(32);
        (Arc::new(ClientConnection::new(ConnectionId::new(), tx)), rx)
    }

    #[test]
    fn max_missed_from_timeout_and_interval() {
        let s = Duration::from_secs;
        assert_eq!(max_missed(s(30), s(30)), 1);
        assert_eq!(max_missed(s(30), s(90)), 3);
        assert_eq!(max_missed(s(30), s(10)), 1);
        assert_eq!(max_missed(Duration::ZERO, s(1)), 1000);
    }

    #[tokio::test]
    async fn heartbeat_cancelled() {
        let (conn, _rx) = make_connection();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run_heartbeat(conn, Duration::from_secs(100), Duration::from_secs(300), cancel).await;
        assert_eq!(result, HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_times_out_after_one_interval() {
        let (conn, _rx) = make_connection();
        let start = time::Instant::now();

        let result = run_heartbeat(
            conn,
            Duration::from_secs(30),
            Duration::from_secs(30),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30) && elapsed < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_before_start_does_not_count() {
        let (conn, _rx) = make_connection();
        conn.mark_alive();
        let start = time::Instant::now();

        let result = run_heartbeat(
            conn,
            Duration::from_millis(100),
            Duration::from_millis(100),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn tolerates_misses_up_to_timeout() {
        let (conn, _rx) = make_connection();
        let start = time::Instant::now();

        let result = run_heartbeat(
            conn,
            Duration::from_millis(100),
            Duration::from_millis(300),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(result, HeartbeatResult::TimedOut);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn active_connection_stays_alive() {
        let (conn, _rx) = make_connection();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_millis(50),
            Duration::from_millis(50),
            cancel.clone(),
        ));

        for _ in 0..20 {
            time::sleep(Duration::from_millis(20)).await;
            conn.mark_alive();
        }
        assert!(!handle.is_finished());

        cancel.cancel();
        assert_eq!(handle.await.unwrap(), HeartbeatResult::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn pings_are_queued_each_interval() {
        let (conn, mut rx) = make_connection();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&conn),
            Duration::from_millis(100),
            Duration::from_millis(1000),
            cancel.clone(),
        ));

        time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        let _ = handle.await.unwrap();

        let mut pings = 0;
        while let Ok(item) = rx.try_recv() {
            assert_eq!(item, Outbound::Ping);
            pings += 1;
        }
        // Immediate probe plus ticks at 100, 200, 300ms.
        assert_eq!(pings, 4);
    }
}
