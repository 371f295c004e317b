//! Per-connection socket task.
//!
//! Splits the socket into a writer task (drains the outbound queue), a
//! heartbeat task, and an inline reader loop. Whichever notices the end first
//! closes the connection; the rest observe its cancellation token.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use relay_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::connection::{ClientConnection, Outbound};
use super::context::RelayContext;
use super::handler;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::metrics::{
    RELAY_FRAMES_REJECTED_TOTAL, RELAY_HEARTBEAT_TIMEOUTS_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Upper bound on sending the close frame during teardown.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Drive one accepted WebSocket until it closes, times out, or `shutdown` fires.
///
/// On return the connection is closed and absent from the registry.
pub async fn run_connection(socket: WebSocket, ctx: Arc<RelayContext>, shutdown: CancellationToken) {
    let (tx, mut rx) = mpsc::channel(ctx.send_queue_capacity);
    let conn = Arc::new(ClientConnection::new(ConnectionId::new(), tx));
    let closed = conn.cancel_token();

    info!(conn_id = %conn.id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: outbound queue → socket.
    let writer_conn = Arc::clone(&conn);
    let writer_ctx = Arc::clone(&ctx);
    let writer_closed = closed.clone();
    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                item = rx.recv() => match item {
                    Some(Outbound::Text(text)) => WsMessage::Text(text.as_str().into()),
                    Some(Outbound::Ping) => WsMessage::Ping(Vec::new().into()),
                    None => break,
                },
                () = writer_closed.cancelled() => break,
            };
            let sent = tokio::select! {
                result = ws_tx.send(message) => result,
                () = writer_closed.cancelled() => break,
            };
            if let Err(e) = sent {
                debug!(conn_id = %writer_conn.id, error = %e, "websocket write failed");
                let _ = writer_conn.close(&writer_ctx.registry);
                break;
            }
        }
        let _ = tokio::time::timeout(CLOSE_FRAME_TIMEOUT, ws_tx.close()).await;
    });

    // Liveness monitor.
    let hb_conn = Arc::clone(&conn);
    let hb_ctx = Arc::clone(&ctx);
    let heartbeat = tokio::spawn(async move {
        let result = run_heartbeat(
            Arc::clone(&hb_conn),
            hb_ctx.heartbeat_interval,
            hb_ctx.heartbeat_timeout,
            hb_conn.cancel_token(),
        )
        .await;
        if result == HeartbeatResult::TimedOut {
            warn!(
                conn_id = %hb_conn.id,
                role = ?hb_conn.role(),
                silent = ?hb_conn.last_seen_elapsed(),
                "heartbeat timed out, closing"
            );
            counter!(RELAY_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
            let _ = hb_conn.close(&hb_ctx.registry);
        }
    });

    // Reader: socket → handler, in arrival order.
    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = closed.cancelled() => break,
            () = shutdown.cancelled() => {
                debug!(conn_id = %conn.id, "server shutting down, closing connection");
                break;
            }
        };
        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                conn.mark_alive();
                let outcome = handler::handle_message(&conn, text.as_str(), &ctx);
                trace!(conn_id = %conn.id, ?outcome, "frame handled");
            }
            Some(Ok(WsMessage::Pong(_) | WsMessage::Ping(_))) => conn.mark_alive(),
            Some(Ok(WsMessage::Binary(data))) => {
                conn.mark_alive();
                warn!(conn_id = %conn.id, len = data.len(), "binary frame ignored");
                counter!(RELAY_FRAMES_REJECTED_TOTAL, "reason" => "binary").increment(1);
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(conn_id = %conn.id, error = %e, "websocket read error");
                break;
            }
        }
    }

    let _ = conn.close(&ctx.registry);
    let _ = writer.await;
    let _ = heartbeat.await;

    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    info!(
        conn_id = %conn.id,
        role = ?conn.role(),
        age = ?conn.age(),
        dropped = conn.drop_count(),
        "client disconnected"
    );
}
