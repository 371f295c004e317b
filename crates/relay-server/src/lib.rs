//! # relay-server
//!
//! Axum HTTP + `WebSocket` signaling relay.
//!
//! - `WebSocket` gateway: per-connection reader/writer tasks, heartbeat, frame dispatch
//! - Role registry: concurrency-safe role → connection-set map with weak membership
//! - Fan-out of `signal` frames to every live connection under the target role
//! - HTTP endpoints: health check, Prometheus metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::RelayServer;
