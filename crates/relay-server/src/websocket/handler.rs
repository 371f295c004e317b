//! Inbound frame dispatch: registration and signal fan-out.
//!
//! Handling is synchronous. Frames from one connection are handled in the
//! order they arrive, and each recipient's queue is FIFO, so per-sender order
//! is preserved end to end.

use std::sync::Arc;

use metrics::counter;
use relay_core::{FrameError, InboundFrame, OutboundFrame, RegistrationError, Role, RolePolicy};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::connection::ClientConnection;
use super::context::RelayContext;
use crate::metrics::{
    RELAY_FRAMES_REJECTED_TOTAL, RELAY_REGISTRATIONS_TOTAL, RELAY_SIGNALS_DEAD_LETTER_TOTAL,
    RELAY_SIGNALS_FORWARDED_TOTAL, role_label,
};

/// Why a frame was dropped without effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Not JSON, not an object, or missing required fields.
    Malformed,
    /// A `type` the relay does not route.
    UnknownType,
    /// A `signal` from a connection not in the registry.
    Unregistered,
    /// The connection closed before the frame was handled.
    ConnectionClosed,
}

/// What handling one frame did.
#[derive(Debug, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The connection now holds this role.
    Registered(Role),
    /// `register` was refused; the connection's state is unchanged.
    RegistrationRejected(RegistrationError),
    /// A `signal` was fanned out.
    Forwarded {
        /// Recipients whose queue accepted the frame.
        delivered: usize,
        /// Recipients whose queue refused it.
        failed: usize,
    },
    /// A `signal` found no live recipient under its target role.
    DeadLetter,
    /// The frame was discarded.
    Dropped(DropReason),
}

/// Handle one inbound text frame from `conn`.
///
/// Never fails: every problem is logged, counted, and contained to this
/// frame. The connection stays open.
pub fn handle_message(conn: &Arc<ClientConnection>, text: &str, ctx: &RelayContext) -> HandleOutcome {
    if !conn.is_open() {
        return HandleOutcome::Dropped(DropReason::ConnectionClosed);
    }

    let frame = match relay_core::decode_frame(text) {
        Ok(frame) => frame,
        Err(FrameError::UnknownType(frame_type)) => {
            debug!(conn_id = %conn.id, frame_type, "unrouted frame type, dropping");
            counter!(RELAY_FRAMES_REJECTED_TOTAL, "reason" => "unknown_type").increment(1);
            return HandleOutcome::Dropped(DropReason::UnknownType);
        }
        Err(e) => {
            warn!(conn_id = %conn.id, error = %e, "malformed frame, dropping");
            counter!(RELAY_FRAMES_REJECTED_TOTAL, "reason" => e.kind()).increment(1);
            return HandleOutcome::Dropped(DropReason::Malformed);
        }
    };

    trace!(conn_id = %conn.id, frame_type = frame.kind(), "frame decoded");
    match frame {
        InboundFrame::Register { role, metadata } => {
            handle_register(conn, &role, metadata.as_ref(), ctx)
        }
        InboundFrame::Signal {
            target,
            role,
            payload,
        } => handle_signal(conn, &target, role.as_deref(), payload, ctx),
    }
}

fn handle_register(
    conn: &Arc<ClientConnection>,
    requested: &str,
    metadata: Option<&Value>,
    ctx: &RelayContext,
) -> HandleOutcome {
    let result = Role::parse(requested, ctx.role_policy)
        .map_err(RegistrationError::from)
        .and_then(|role| conn.register(role.clone(), &ctx.registry).map(|()| role));

    let role = match result {
        Ok(role) => role,
        Err(e) => {
            warn!(conn_id = %conn.id, requested, error = %e, "registration rejected");
            counter!(RELAY_FRAMES_REJECTED_TOTAL, "reason" => e.kind()).increment(1);
            return HandleOutcome::RegistrationRejected(e);
        }
    };

    let counterpart = role.counterpart();
    info!(
        conn_id = %conn.id,
        role = %role,
        metadata = ?metadata,
        members = ctx.registry.count(&role),
        counterpart = ?counterpart,
        counterpart_members = counterpart.as_ref().map_or(0, |peer| ctx.registry.count(peer)),
        "client registered"
    );
    counter!(RELAY_REGISTRATIONS_TOTAL, "role" => role_label(&role)).increment(1);

    if ctx.confirm_registration {
        let ack = OutboundFrame::registration_confirmed(role.clone());
        if let Err(e) = conn.send_frame(&ack) {
            ctx.handle_send_failure(conn, e);
        }
    }
    HandleOutcome::Registered(role)
}

fn handle_signal(
    conn: &Arc<ClientConnection>,
    target: &str,
    claimed: Option<&str>,
    payload: Value,
    ctx: &RelayContext,
) -> HandleOutcome {
    // The registry is authoritative: a connection that has left it no
    // longer speaks for its role.
    let Some(from) = ctx.registry.role_of(&conn.id) else {
        warn!(conn_id = %conn.id, target, "signal from unregistered connection, dropping");
        counter!(RELAY_FRAMES_REJECTED_TOTAL, "reason" => "unregistered").increment(1);
        return HandleOutcome::Dropped(DropReason::Unregistered);
    };

    if let Some(claimed) = claimed.filter(|claimed| *claimed != from.as_str()) {
        warn!(
            conn_id = %conn.id,
            claimed,
            registered = %from,
            "signal role does not match registration, using registered role"
        );
    }

    // Any non-empty target is looked up. Under a closed policy unknown
    // names simply have no members.
    let Ok(target) = Role::parse(target, RolePolicy::Open) else {
        debug!(conn_id = %conn.id, "signal with empty target, dropping");
        counter!(RELAY_SIGNALS_DEAD_LETTER_TOTAL, "target" => "none").increment(1);
        return HandleOutcome::DeadLetter;
    };

    let encoded = match (OutboundFrame::Signal {
        from: from.clone(),
        payload,
    })
    .encode()
    {
        Ok(json) => Arc::new(json),
        Err(e) => {
            warn!(conn_id = %conn.id, error = %e, "failed to encode signal, dropping");
            return HandleOutcome::Dropped(DropReason::Malformed);
        }
    };

    let mut delivered = 0usize;
    let mut failed = 0usize;
    let _ = ctx.registry.for_each(&target, |peer| {
        if peer.id == conn.id {
            return;
        }
        match peer.send(Arc::clone(&encoded)) {
            Ok(()) => delivered += 1,
            Err(e) => {
                failed += 1;
                ctx.handle_send_failure(peer, e);
            }
        }
    });

    if delivered == 0 && failed == 0 {
        debug!(conn_id = %conn.id, from = %from, target = %target, "no live recipient, dropping signal");
        counter!(RELAY_SIGNALS_DEAD_LETTER_TOTAL, "target" => role_label(&target)).increment(1);
        return HandleOutcome::DeadLetter;
    }

    debug!(conn_id = %conn.id, from = %from, target = %target, delivered, failed, "signal forwarded");
    counter!(RELAY_SIGNALS_FORWARDED_TOTAL, "target" => role_label(&target))
        .increment(delivered as u64);
    HandleOutcome::Forwarded { delivered, failed }
}
