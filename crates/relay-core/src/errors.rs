//! Error taxonomy for frame decoding and registration.
//!
//! None of these errors ever leave a connection: they are logged, counted,
//! and the offending frame is dropped.

use thiserror::Error;

use crate::roles::Role;

/// A text frame that could not be decoded into an [`InboundFrame`](crate::InboundFrame).
#[derive(Debug, Error)]
pub enum FrameError {
    /// Not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// Valid JSON, but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// No string `type` field.
    #[error("frame has no `type` field")]
    MissingType,
    /// A `type` the relay does not route (e.g. client-side `chat`).
    #[error("unsupported frame type `{0}`")]
    UnknownType(String),
    /// Known `type`, but required fields are missing or mistyped.
    #[error("invalid `{frame_type}` frame: {source}")]
    InvalidFields {
        /// The frame's `type`.
        frame_type: &'static str,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::UnknownType(_) => "unknown_type",
            Self::InvalidFields { .. } => "invalid_fields",
        }
    }
}

/// A role string the relay refuses to use as an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Empty or whitespace-only.
    #[error("role is empty")]
    Empty,
    /// Not admitted by the active role policy.
    #[error("unknown role `{0}`")]
    Unknown(String),
}

/// Why a `register` frame did not take effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The connection already holds a role; roles are assigned exactly once.
    #[error("connection is already registered as `{current}`")]
    AlreadyRegistered {
        /// The role assigned by the first `register`.
        current: Role,
    },
    /// The requested role was rejected.
    #[error(transparent)]
    InvalidRole(#[from] RoleError),
    /// The connection closed before the registration could land.
    #[error("connection is closed")]
    ConnectionClosed,
}

impl RegistrationError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered { .. } => "already_registered",
            Self::InvalidRole(RoleError::Empty) => "empty_role",
            Self::InvalidRole(RoleError::Unknown(_)) => "unknown_role",
            Self::ConnectionClosed => "connection_closed",
        }
    }
}
