//! JSON wire protocol.
//!
//! One JSON object per WebSocket text frame. Clients send `register` and
//! `signal`; the relay answers with `registration-confirmed` and forwards
//! `signal` frames with the sender's role stamped in `from`. Payloads are
//! carried as opaque [`serde_json::Value`]s and never inspected.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FrameError;
use crate::roles::Role;

/// A frame received from a client.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundFrame {
    /// Claim a role for this connection.
    Register {
        /// Requested role, validated against the role policy by the router.
        role: String,
        /// Client hints (location, bandwidth). Logged, never interpreted.
        #[serde(default)]
        metadata: Option<Value>,
    },
    /// Relay an SDP or ICE envelope to every connection under `target`.
    Signal {
        /// Role to deliver to.
        target: String,
        /// Sender's self-declared role. The registered role is authoritative.
        #[serde(default)]
        role: Option<String>,
        /// Opaque envelope, forwarded untouched.
        payload: Value,
    },
}

impl InboundFrame {
    /// Wire name of the frame kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Signal { .. } => "signal",
        }
    }
}

/// A frame sent by the relay.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundFrame {
    /// Acknowledges a successful `register`.
    RegistrationConfirmed {
        /// The role now held by the connection.
        role: Role,
        /// RFC 3339 UTC with millisecond precision.
        timestamp: String,
    },
    /// A forwarded signal.
    Signal {
        /// The sender's registered role.
        from: Role,
        /// The sender's payload, unchanged.
        payload: Value,
    },
}

impl OutboundFrame {
    /// Build a registration acknowledgment stamped with the current time.
    pub fn registration_confirmed(role: Role) -> Self {
        Self::RegistrationConfirmed {
            role,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode one inbound text frame.
///
/// Decoding is two-step so an unrouted `type` (the browser clients also emit
/// `chat`, `reconnect`, and `device-update`) is distinguishable from a
/// malformed `register`/`signal`.
pub fn decode_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::InvalidJson)?;
    let Value::Object(ref fields) = value else {
        return Err(FrameError::NotAnObject);
    };
    let frame_type = match fields.get("type").and_then(Value::as_str) {
        Some("register") => "register",
        Some("signal") => "signal",
        Some(other) => return Err(FrameError::UnknownType(other.to_owned())),
        None => return Err(FrameError::MissingType),
    };
    serde_json::from_value(value).map_err(|source| FrameError::InvalidFields { frame_type, source })
}
