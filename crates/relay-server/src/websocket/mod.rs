//! WebSocket connection management, role registry, routing, and liveness.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-connection state: role, outbound queue, liveness, close |
//! | `registry` | Role → connection-set map with snapshot iteration |
//! | `handler` | Frame decoding, registration state machine, signal fan-out |
//! | `heartbeat` | Periodic ping/pong for connection liveness detection |
//! | `socket` | WebSocket upgrade target: reader/writer loops and teardown |
//! | `context` | Shared relay state handed to every connection |
//!
//! ## Data Flow
//!
//! `socket` reader → `handler` → `registry` snapshot → target `connection` queues → target `socket` writer.

pub mod connection;
pub mod context;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod socket;
