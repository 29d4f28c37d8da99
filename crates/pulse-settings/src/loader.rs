//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{LogLevel, PulseSettings};

/// Resolve the default settings file path (`~/.pulse/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pulse").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PulseSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides, then validate.
///
/// A missing file yields defaults; a malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<PulseSettings> {
    let defaults = serde_json::to_value(PulseSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PulseSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `PULSE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut PulseSettings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

/// Apply `PULSE_*` overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are logged and
/// ignored.
pub fn apply_overrides_from(settings: &mut PulseSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("PULSE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_ranged(&read, "PULSE_PORT", 0u16, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = read_ranged(&read, "PULSE_QUEUE_CAPACITY", 1usize, 1_000_000) {
        settings.server.outbound_queue_capacity = v;
    }
    if let Some(v) = read_ranged(&read, "PULSE_HEARTBEAT_INTERVAL_MS", 100u64, 600_000) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_ranged(&read, "PULSE_HEARTBEAT_TIMEOUT_MS", 100u64, 3_600_000) {
        settings.server.heartbeat_timeout_ms = v;
    }
    if let Some(v) = read_ranged(&read, "PULSE_SLOW_CLIENT_DROP_LIMIT", 0u64, u64::MAX) {
        settings.server.slow_client_drop_limit = v;
    }
    if let Some(v) = read("PULSE_LOG_LEVEL") {
        match parse_log_level(&v) {
            Some(level) => settings.logging.level = level,
            None => warn!(key = "PULSE_LOG_LEVEL", value = %v, "invalid log level env var, ignoring"),
        }
    }
    if let Some(v) = read("PULSE_LOG_JSON") {
        match parse_bool(&v) {
            Some(flag) => settings.logging.json = flag,
            None => warn!(key = "PULSE_LOG_JSON", value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

fn read_ranged<T>(
    read: impl Fn(&str) -> Option<String>,
    key: &str,
    min: T,
    max: T,
) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let raw = read(key)?;
    let parsed = parse_range(&raw, min, max);
    if parsed.is_none() {
        warn!(key, value = %raw, "invalid numeric env var, ignoring");
    }
    parsed
}

/// Parse `val` as a number within `min..=max`.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_log_level(val: &str) -> Option<LogLevel> {
    serde_json::from_value(Value::String(val.trim().to_lowercase())).ok()
}
