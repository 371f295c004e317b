//! # relay-settings
//!
//! Configuration for the studio signaling relay, loaded from three layers
//! (in priority order):
//!
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults (path from
//!    `--config` or `RELAY_CONFIG`)
//! 3. **Environment variables**: `PORT` and `RELAY_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, rejected_env_overrides,
    settings_path_from_env,
};
pub use types::*;
