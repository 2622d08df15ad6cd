//! # warden-core
//!
//! Foundation types shared by every Warden crate:
//!
//! - **Branded IDs**: `CommunityId`, `MemberId`, `ChannelId`, `MessageId`
//! - **Escalation policy**: warning count → timeout duration
//! - **Snapshot**: the persisted ledger document and its schema validation
//! - **Collaborators**: `Classifier` and `ChatPlatform` traits, message events
//! - **Notices**: platform-neutral structured replies

#![deny(unsafe_code)]

pub mod errors;
pub mod escalation;
pub mod ids;
pub mod notice;
pub mod platform;
pub mod snapshot;

pub use errors::{ClassifyError, FailureClass, PlatformError, SchemaError};
pub use ids::{AuditEntryId, ChannelId, CommunityId, MemberId, MemberKey, MessageId};
pub use notice::{Notice, NoticeField, Tone};
pub use platform::{Attachment, ChatPlatform, Classifier, MessageEvent, MessageRef};
pub use snapshot::{AuditEntry, MemberWarnings, Snapshot};

/// Scores strictly above this value are violations.
pub const VIOLATION_THRESHOLD: f64 = 0.5;
