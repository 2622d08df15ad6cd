//! Ledger snapshot: the unit of persistence.
//!
//! A snapshot is one JSON document with three top-level sections:
//!
//! ```json
//! {
//!   "enabled_servers": { "<community>": true },
//!   "user_warnings":   { "<community>": { "<member>": 2 } },
//!   "moderation_log":  [ { ...audit entry... } ]
//! }
//! ```
//!
//! [`Snapshot::from_json`] is the schema-validation step run at load time. A
//! missing (or `null`) section defaults to empty; a section of the wrong shape
//! is a [`SchemaError`] naming that section. Unknown top-level keys are
//! ignored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SchemaError;
use crate::ids::{AuditEntryId, CommunityId, MemberId, MessageId};

/// Section holding per-community enablement flags.
pub const ENABLED_SECTION: &str = "enabled_servers";
/// Section holding per-community, per-member warning counts.
pub const WARNINGS_SECTION: &str = "user_warnings";
/// Section holding the append-only audit trail.
pub const AUDIT_SECTION: &str = "moderation_log";

/// Warning counters of one community.
pub type MemberWarnings = BTreeMap<MemberId, u32>;

/// Immutable record of one completed enforcement action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// When the enforcement completed.
    pub timestamp: DateTime<Utc>,
    /// Community the violation happened in.
    pub community_id: CommunityId,
    /// Offending member.
    pub member_id: MemberId,
    /// Offending message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Classification score that triggered enforcement.
    pub score: f64,
    /// Warning count after the increment.
    pub warning_count: u32,
    /// Timeout applied (or attempted), in seconds.
    pub timeout_secs: u64,
    /// Whether the message was deleted.
    pub message_deleted: bool,
    /// Whether the member timeout was applied.
    pub member_timed_out: bool,
}

/// Full serializable ledger state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Community → enforcement enabled.
    #[serde(rename = "enabled_servers")]
    pub enabled: BTreeMap<CommunityId, bool>,
    /// Community → member → warning count.
    #[serde(rename = "user_warnings")]
    pub warnings: BTreeMap<CommunityId, MemberWarnings>,
    /// Append-only audit trail, oldest first.
    #[serde(rename = "moderation_log")]
    pub audit: Vec<AuditEntry>,
}

impl Snapshot {
    /// Parse and validate a persisted document.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut root) = value else {
            return Err(SchemaError::NotAnObject);
        };

        Ok(Self {
            enabled: take_section(&mut root, ENABLED_SECTION)?,
            warnings: take_section(&mut root, WARNINGS_SECTION)?,
            audit: take_section(&mut root, AUDIT_SECTION)?,
        })
    }

    /// Serialize as the on-disk document (pretty-printed).
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Number of communities with enforcement switched on.
    #[must_use]
    pub fn enabled_count(&self) -> usize {
        self.enabled.values().filter(|on| **on).count()
    }

    /// Whether the snapshot holds no state at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.warnings.is_empty() && self.audit.is_empty()
    }
}

fn take_section<T>(root: &mut Map<String, Value>, section: &'static str) -> Result<T, SchemaError>
where
    T: DeserializeOwned + Default,
{
    match root.remove(section) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value)
            .map_err(|source| SchemaError::InvalidSection { section, source }),
    }
}
