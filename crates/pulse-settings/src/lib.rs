//! # pulse-settings
//!
//! Configuration for the Pulse server, loaded from three layers (lowest to
//! highest priority):
//! 1. **Compiled defaults**: [`PulseSettings::default()`]
//! 2. **Settings file**: `~/.pulse/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `PULSE_*` overrides
//!
//! The binary applies CLI flags on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::{LogLevel, LoggingSettings, PulseSettings, ServerSettings};
