//! Structured notices posted to the platform.
//!
//! A [`Notice`] is platform-neutral: a title, an optional description, a list
//! of named fields, a severity tone and a footer. Adapters render it as an
//! embed, a card, or plain text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Visual tone of a notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Informational (blue).
    Info,
    /// Success confirmation (green).
    Success,
    /// Attention needed (orange).
    Warning,
    /// Violation or refusal (red).
    Danger,
}

/// One named value in a notice.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeField {
    /// Field label.
    pub name: String,
    /// Field value.
    pub value: String,
    /// Whether the field may share a row with its neighbours.
    pub inline: bool,
}

/// Structured message content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    /// Headline.
    pub title: String,
    /// Optional body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tone.
    pub tone: Tone,
    /// Fields in display order.
    #[serde(default)]
    pub fields: Vec<NoticeField>,
    /// Optional footer line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    /// Optional timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Notice {
    /// Start a notice with a title and tone.
    pub fn new(title: impl Into<String>, tone: Tone) -> Self {
        Self {
            title: title.into(),
            description: None,
            tone,
            fields: Vec::new(),
            footer: None,
            timestamp: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Append an inline field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_field(name.into(), value.into(), true)
    }

    /// Append a full-width field.
    #[must_use]
    pub fn wide_field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_field(name.into(), value.into(), false)
    }

    /// Set the footer.
    #[must_use]
    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(text.into());
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }

    /// Look up a field value by name.
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    fn push_field(mut self, name: String, value: String, inline: bool) -> Self {
        self.fields.push(NoticeField { name, value, inline });
        self
    }
}
