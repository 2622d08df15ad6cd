//! Violation notice rendering.

use chrono::{DateTime, Utc};
use warden_core::escalation::{format_duration, is_max_escalation};
use warden_core::{Notice, Tone};

use crate::pipeline::ViolationRecord;

/// Title of every violation notice.
pub const VIOLATION_TITLE: &str = "NSFW Content Detected";

/// Footer of every violation notice.
pub const VIOLATION_FOOTER: &str = "Automated Moderation System";

/// Field naming the maximum-escalation marker.
pub const MAX_ESCALATION_FIELD: &str = "Maximum Escalation";

fn mark(ok: bool) -> &'static str {
    if ok { "✅" } else { "❌" }
}

/// Summary posted to the channel after an enforcement action.
pub fn violation_notice(record: &ViolationRecord, at: DateTime<Utc>) -> Notice {
    let notice = Notice::new(VIOLATION_TITLE, Tone::Danger)
        .field("User", record.member_id.mention())
        .field("NSFW Score", format!("`{:.3}`", record.score))
        .field("Warning Count", format!("`{}`", record.warning_count))
        .field("Timeout Duration", format_duration(record.timeout))
        .field("Message Removed", mark(record.message_deleted))
        .field("User Timed Out", mark(record.member_timed_out));

    let notice = if is_max_escalation(record.warning_count) {
        notice.wide_field(MAX_ESCALATION_FIELD, "User has reached maximum timeout duration")
    } else {
        notice
    };

    notice.footer(VIOLATION_FOOTER).timestamp(at)
}
