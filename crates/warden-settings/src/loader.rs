//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WardenSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `WARDEN_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::WardenSettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_VAR: &str = "WARDEN_SETTINGS";

/// Resolve the settings file: `$WARDEN_SETTINGS`, else `./warden.json`.
pub fn settings_path() -> PathBuf {
    read_env_string(SETTINGS_PATH_VAR).map_or_else(|| PathBuf::from("warden.json"), PathBuf::from)
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WardenSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid final value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<WardenSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<WardenSettings> {
    let defaults = serde_json::to_value(WardenSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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
pub fn apply_env_overrides(settings: &mut WardenSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value
/// stays in place.
pub fn apply_overrides<F>(settings: &mut WardenSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = string("WARDEN_DATA_FILE") {
        settings.data_file = v;
    }
    if let Some(v) = string("WARDEN_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("WARDEN_LOG_DB") {
        settings.logging.sqlite_path = Some(v);
    }
    if let Some(v) = string("WARDEN_CLASSIFIER_URL") {
        settings.classifier.endpoint = Some(v);
    }
    if let Some(v) = checked(&lookup, "WARDEN_MAX_IN_FLIGHT", |s| parse_usize_range(s, 1, 4096)) {
        settings.enforcement.max_in_flight = v;
    }
    if let Some(v) = checked(&lookup, "WARDEN_CLASSIFY_TIMEOUT_MS", |s| {
        parse_u64_range(s, 100, 600_000)
    }) {
        settings.enforcement.classify_timeout_ms = v;
    }
    if let Some(v) = checked(&lookup, "WARDEN_IMAGES_ONLY", parse_bool) {
        settings.enforcement.image_attachments_only = v;
    }
}

fn checked<F, T>(lookup: &F, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(name)?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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
