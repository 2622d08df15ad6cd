//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file may name only the values it changes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the moderator.
///
/// ```json
/// {
///   "dataFile": "/var/lib/warden/moderation_data.json",
///   "enforcement": { "maxInFlight": 8 },
///   "classifier": { "endpoint": "http://127.0.0.1:8500/classify" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WardenSettings {
    /// Path of the ledger document.
    pub data_file: String,
    /// Enforcement pipeline tuning.
    pub enforcement: EnforcementSettings,
    /// Classifier binding.
    pub classifier: ClassifierSettings,
    /// Command surface.
    pub commands: CommandSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for WardenSettings {
    fn default() -> Self {
        Self {
            data_file: "moderation_data.json".to_string(),
            enforcement: EnforcementSettings::default(),
            classifier: ClassifierSettings::default(),
            commands: CommandSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl WardenSettings {
    /// Ledger document path.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_file)
    }

    /// Reject values that cannot drive a running moderator.
    pub fn validate(&self) -> Result<()> {
        if self.data_file.trim().is_empty() {
            return Err(SettingsError::InvalidValue("dataFile must not be empty".into()));
        }
        if self.enforcement.max_in_flight == 0 {
            return Err(SettingsError::InvalidValue(
                "enforcement.maxInFlight must be at least 1".into(),
            ));
        }
        if self.enforcement.classify_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "enforcement.classifyTimeoutMs must be at least 1".into(),
            ));
        }
        if self.commands.prefix.trim().is_empty() || self.commands.prefix.contains(char::is_whitespace) {
            return Err(SettingsError::InvalidValue(
                "commands.prefix must be a single non-empty token".into(),
            ));
        }
        Ok(())
    }
}

/// Enforcement pipeline tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnforcementSettings {
    /// Maximum pipeline instances running at once.
    pub max_in_flight: usize,
    /// Bounded wait for one classification, in milliseconds.
    pub classify_timeout_ms: u64,
    /// Only classify attachments whose content-type hint names an image.
    pub image_attachments_only: bool,
}

impl Default for EnforcementSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 32,
            classify_timeout_ms: 15_000,
            image_attachments_only: true,
        }
    }
}

impl EnforcementSettings {
    /// Classification timeout as a [`Duration`].
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }
}

/// HTTP classifier binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierSettings {
    /// Classification endpoint. Without one every classification fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// HTTP request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 10_000,
        }
    }
}

/// Command surface.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandSettings {
    /// Token that starts the command group.
    pub prefix: String,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            prefix: ":mod".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level (`RUST_LOG` still wins).
    pub level: String,
    /// Optional SQLite database receiving persisted log rows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            sqlite_path: None,
        }
    }
}
