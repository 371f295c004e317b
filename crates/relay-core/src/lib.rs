//! # relay-core
//!
//! Shared vocabulary for the studio signaling relay.
//!
//! - **Branded IDs**: [`ConnectionId`] for per-transport session handles
//! - **Roles**: [`Role`] addressing keys and the [`RolePolicy`] that admits them
//! - **Protocol**: inbound/outbound JSON frames and [`decode_frame`]
//! - **Errors**: frame, role, and registration failures via `thiserror`
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod protocol;
pub mod roles;

pub use errors::{FrameError, RegistrationError, RoleError};
pub use ids::ConnectionId;
pub use logging::LogFormat;
pub use protocol::{InboundFrame, OutboundFrame, decode_frame};
pub use roles::{Role, RolePolicy};
