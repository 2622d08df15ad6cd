//! # warden-settings
//!
//! Layered configuration for the moderator.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WardenSettings::default()`]
//! 2. **Settings file**: `$WARDEN_SETTINGS` or `./warden.json`, deep-merged over defaults
//! 3. **Environment variables**: `WARDEN_*` overrides (highest priority)
//!
//! The violation threshold and the escalation table are not settings; they
//! live in `warden-core` as constants.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
