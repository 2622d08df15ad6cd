//! Enforcement pipeline: one inbound message from arrival to audit record.
//!
//! ```text
//! Received
//!   → guard: author is not this bot (or any bot)
//!   → guard: posted in a community
//!   → guard: community enabled
//!   → for each attachment in arrival order:
//!         classify → failed: skip │ score ≤ threshold: next │ score > threshold: Violation
//!   → NoViolation | Violation
//! ```
//!
//! Only the first qualifying attachment is enforced. A violation runs, under
//! the member's lock: increment, escalation lookup, delete, timeout, notify,
//! audit append, persist. External side effects may fail independently; the
//! increment and the audit entry happen regardless.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{Instrument, debug, info, info_span, warn};
use warden_core::escalation::timeout_for;
use warden_core::{
    AuditEntry, AuditEntryId, ChatPlatform, Classifier, ClassifyError, CommunityId, FailureClass,
    MemberId, MessageEvent, MessageId, MessageRef, VIOLATION_THRESHOLD,
};
use warden_ledger::ViolationLedger;

use crate::notice::violation_notice;

/// Pipeline tuning.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Scores strictly above this are violations.
    pub threshold: f64,
    /// Bounded wait for a single classification.
    pub classify_timeout: Duration,
    /// Skip attachments whose content-type hint does not name an image.
    pub image_attachments_only: bool,
    /// This bot's own member id; its messages are never scanned.
    pub self_id: Option<MemberId>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: VIOLATION_THRESHOLD,
            classify_timeout: Duration::from_secs(15),
            image_attachments_only: true,
            self_id: None,
        }
    }
}

/// Why a message was not scanned at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Posted by this bot.
    OwnMessage,
    /// Posted by another automated account.
    BotAuthor,
    /// Not posted in a community.
    DirectMessage,
    /// Enforcement is off in the community.
    NotEnabled,
}

/// Attachment tallies for a message with no violation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Attachments that produced a score.
    pub scanned: usize,
    /// Attachments whose classification failed.
    pub failed: usize,
    /// Attachments skipped without classification.
    pub skipped: usize,
}

/// What happened when a violation was enforced.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    /// Id of the audit entry written for this violation.
    pub audit_id: AuditEntryId,
    /// Community.
    pub community_id: CommunityId,
    /// Offending member.
    pub member_id: MemberId,
    /// Offending message.
    pub message_id: MessageId,
    /// Position of the qualifying attachment in the message.
    pub attachment_index: usize,
    /// Score of the qualifying attachment.
    pub score: f64,
    /// Warning count after the increment.
    pub warning_count: u32,
    /// Timeout applied (or attempted).
    pub timeout: Duration,
    /// Whether the message was deleted.
    pub message_deleted: bool,
    /// Whether the member was timed out.
    pub member_timed_out: bool,
    /// Whether the notice was posted.
    pub notified: bool,
    /// Whether the ledger reached disk afterwards.
    pub persisted: bool,
}

/// Terminal state of one pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// Never scanned.
    Ignored(IgnoreReason),
    /// Scanned, nothing above threshold.
    NoViolation(ScanSummary),
    /// A violation was enforced.
    Violation(ViolationRecord),
}

/// Runs inbound messages through classification and enforcement.
pub struct EnforcementPipeline {
    ledger: Arc<ViolationLedger>,
    classifier: Arc<dyn Classifier>,
    platform: Arc<dyn ChatPlatform>,
    config: PipelineConfig,
}

impl EnforcementPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        ledger: Arc<ViolationLedger>,
        classifier: Arc<dyn Classifier>,
        platform: Arc<dyn ChatPlatform>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ledger,
            classifier,
            platform,
            config,
        }
    }

    /// The ledger this pipeline writes to.
    pub fn ledger(&self) -> &Arc<ViolationLedger> {
        &self.ledger
    }

    /// Run one message to a terminal state.
    pub async fn handle(&self, event: &MessageEvent) -> Outcome {
        if self.config.self_id.as_ref() == Some(&event.author_id) {
            return Outcome::Ignored(IgnoreReason::OwnMessage);
        }
        if event.author_is_bot {
            return Outcome::Ignored(IgnoreReason::BotAuthor);
        }
        let Some(message) = event.message_ref() else {
            return Outcome::Ignored(IgnoreReason::DirectMessage);
        };
        if !self.ledger.is_enabled(&message.community_id) {
            return Outcome::Ignored(IgnoreReason::NotEnabled);
        }

        let span = info_span!(
            "enforce",
            component = "enforcement",
            community_id = %message.community_id,
            member_id = %event.author_id,
            message_id = %message.message_id,
        );
        self.scan(event, message).instrument(span).await
    }

    async fn scan(&self, event: &MessageEvent, message: MessageRef) -> Outcome {
        let mut summary = ScanSummary::default();

        for (index, attachment) in event.attachments.iter().enumerate() {
            if self.config.image_attachments_only && !attachment.is_image() {
                summary.skipped += 1;
                continue;
            }

            let score = match self.classify(&attachment.url).await {
                Ok(score) => score,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        attachment = index,
                        error = %e,
                        failure_class = %FailureClass::from(&e),
                        "classification failed, skipping attachment"
                    );
                    continue;
                }
            };
            summary.scanned += 1;
            debug!(attachment = index, score, "attachment classified");

            if score > self.config.threshold {
                let record = self.enforce(&event.author_id, message, index, score).await;
                return Outcome::Violation(record);
            }
        }

        debug!(
            scanned = summary.scanned,
            failed = summary.failed,
            skipped = summary.skipped,
            "no violation"
        );
        Outcome::NoViolation(summary)
    }

    async fn classify(&self, locator: &str) -> Result<f64, ClassifyError> {
        let limit = self.config.classify_timeout;
        match tokio::time::timeout(limit, self.classifier.classify(locator)).await {
            Err(_) => Err(ClassifyError::Timeout(limit)),
            Ok(Ok(score)) if !(0.0..=1.0).contains(&score) => Err(ClassifyError::OutOfRange(score)),
            Ok(result) => result,
        }
    }

    async fn enforce(
        &self,
        member: &MemberId,
        message: MessageRef,
        attachment_index: usize,
        score: f64,
    ) -> ViolationRecord {
        let community = &message.community_id;
        let _guard = self.ledger.lock_member(community, member).await;

        let warning_count = self.ledger.increment_warning(community, member);
        let timeout = timeout_for(warning_count);

        let message_deleted = match self.platform.delete_message(&message).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "message deletion failed");
                false
            }
        };

        let reason = format!("NSFW image detected (score: {score:.3})");
        let member_timed_out = match self
            .platform
            .timeout_member(community, member, timeout, &reason)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "member timeout failed");
                false
            }
        };

        let mut record = ViolationRecord {
            audit_id: AuditEntryId::new(),
            community_id: community.clone(),
            member_id: member.clone(),
            message_id: message.message_id.clone(),
            attachment_index,
            score,
            warning_count,
            timeout,
            message_deleted,
            member_timed_out,
            notified: false,
            persisted: false,
        };

        let now = Utc::now();
        let notice = violation_notice(&record, now);
        record.notified = match self.platform.notify(community, &message.channel_id, &notice).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, kind = e.error_kind(), "violation notice not delivered");
                false
            }
        };

        self.ledger.append_audit(AuditEntry {
            id: record.audit_id.clone(),
            timestamp: now,
            community_id: community.clone(),
            member_id: member.clone(),
            message_id: Some(message.message_id.clone()),
            score,
            warning_count,
            timeout_secs: timeout.as_secs(),
            message_deleted,
            member_timed_out,
        });
        record.persisted = self.ledger.persist().await.is_ok();

        info!(
            score,
            warning_count,
            timeout_secs = timeout.as_secs(),
            message_deleted,
            member_timed_out,
            persisted = record.persisted,
            "violation enforced"
        );
        record
    }
}
