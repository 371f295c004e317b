//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use relay_core::{LogFormat, RolePolicy};
use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::RelaySettings;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "RELAY_CONFIG";

/// Settings file path from `RELAY_CONFIG`, if set.
pub fn settings_path_from_env() -> Option<PathBuf> {
    read_env_string(CONFIG_ENV).map(PathBuf::from)
}

/// Load settings: defaults, then the optional file, then env overrides.
///
/// The result is validated.
pub fn load_settings(path: Option<&Path>) -> Result<RelaySettings> {
    let settings = match path {
        Some(p) => load_settings_from_path(p)?,
        None => {
            let mut settings = RelaySettings::default();
            let _ = apply_env_overrides(&mut settings);
            settings
        }
    };
    settings.validate()?;
    Ok(settings)
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    let _ = apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
///
/// Returns the variables that were set but ignored as invalid.
pub fn apply_env_overrides(settings: &mut RelaySettings) -> Vec<&'static str> {
    apply_overrides(settings, |name| std::env::var(name).ok())
}

/// Environment variables currently set to values the loader ignores.
///
/// Loading runs before a subscriber is installed, so callers re-check once
/// logging is up.
pub fn rejected_env_overrides() -> Vec<&'static str> {
    apply_env_overrides(&mut RelaySettings::default())
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are ignored with a warning (fall back to file/default).
/// Returns the names of the ignored variables.
pub fn apply_overrides(
    settings: &mut RelaySettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<&'static str> {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let mut rejected = Vec::new();

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = parsed(&get, &mut rejected, "PORT", |s| parse_u16_range(s, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = get("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = parsed(&get, &mut rejected, "RELAY_MAX_CONNECTIONS", |s| {
        parse_usize_range(s, 1, 1_000_000)
    }) {
        settings.server.max_connections = v;
    }

    // ── Heartbeat ───────────────────────────────────────────────────
    if let Some(v) = parsed(&get, &mut rejected, "RELAY_HEARTBEAT_INTERVAL_MS", |s| {
        parse_u64_range(s, 1, 3_600_000)
    }) {
        settings.heartbeat.interval_ms = v;
    }
    if let Some(v) = parsed(&get, &mut rejected, "RELAY_HEARTBEAT_TIMEOUT_MS", |s| {
        parse_u64_range(s, 1, 3_600_000)
    }) {
        settings.heartbeat.timeout_ms = v;
    }

    // ── Routing ─────────────────────────────────────────────────────
    if let Some(v) = parsed(&get, &mut rejected, "RELAY_ROLE_POLICY", |s| s.parse::<RolePolicy>().ok()) {
        settings.relay.role_policy = v;
    }
    if let Some(v) = parsed(&get, &mut rejected, "RELAY_CONFIRM_REGISTRATION", parse_bool) {
        settings.relay.confirm_registration = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = get("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = parsed(&get, &mut rejected, "RELAY_LOG_FORMAT", |s| s.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
    rejected
}

fn parsed<T>(
    get: &impl Fn(&str) -> Option<String>,
    rejected: &mut Vec<&'static str>,
    name: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = get(name)?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid env var, ignoring");
        rejected.push(name);
    }
    result
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
