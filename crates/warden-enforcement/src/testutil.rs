//! In-memory collaborators for tests and dry runs.
//!
//! [`MockClassifier`] answers from a table keyed by locator; [`RecordingPlatform`]
//! records every side effect and can be told to refuse some of them.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use warden_core::{
    Attachment, ChannelId, ChatPlatform, Classifier, ClassifyError, CommunityId, MemberId,
    MessageEvent, MessageRef, Notice, PlatformError,
};

/// Classifier answering from a fixed table.
///
/// Unknown locators fail with [`ClassifyError::Unavailable`].
#[derive(Default)]
pub struct MockClassifier {
    answers: HashMap<String, Result<f64, ClassifyError>>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockClassifier {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `score` for `locator`.
    #[must_use]
    pub fn with_score(mut self, locator: &str, score: f64) -> Self {
        let _ = self.answers.insert(locator.to_string(), Ok(score));
        self
    }

    /// Fail for `locator`.
    #[must_use]
    pub fn with_failure(mut self, locator: &str) -> Self {
        let _ = self.answers.insert(
            locator.to_string(),
            Err(ClassifyError::Backend("mock failure".into())),
        );
        self
    }

    /// Sleep before answering for `locator`.
    #[must_use]
    pub fn with_delay(mut self, locator: &str, delay: Duration) -> Self {
        let _ = self.delays.insert(locator.to_string(), delay);
        self
    }

    /// Locators classified so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, locator: &str) -> Result<f64, ClassifyError> {
        self.calls.lock().push(locator.to_string());
        if let Some(delay) = self.delays.get(locator) {
            tokio::time::sleep(*delay).await;
        }
        self.answers
            .get(locator)
            .cloned()
            .unwrap_or_else(|| Err(ClassifyError::Unavailable(locator.to_string())))
    }
}

/// One side effect seen by [`RecordingPlatform`].
#[derive(Clone, Debug, PartialEq)]
pub enum PlatformAction {
    /// `delete_message` succeeded.
    Deleted(MessageRef),
    /// `timeout_member` succeeded.
    TimedOut {
        /// Community.
        community: CommunityId,
        /// Member.
        member: MemberId,
        /// Requested duration.
        duration: Duration,
        /// Audit-log reason.
        reason: String,
    },
    /// `notify` succeeded.
    Notified {
        /// Community.
        community: CommunityId,
        /// Channel.
        channel: ChannelId,
        /// Posted notice.
        notice: Notice,
    },
}

/// Platform that records successful side effects.
#[derive(Default)]
pub struct RecordingPlatform {
    actions: Mutex<Vec<PlatformAction>>,
    deny_delete: bool,
    deny_timeout: bool,
    fail_notify: bool,
}

impl RecordingPlatform {
    /// Platform where every action succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse deletions as forbidden.
    #[must_use]
    pub fn deny_delete(mut self) -> Self {
        self.deny_delete = true;
        self
    }

    /// Refuse timeouts as forbidden.
    #[must_use]
    pub fn deny_timeout(mut self) -> Self {
        self.deny_timeout = true;
        self
    }

    /// Fail every notice.
    #[must_use]
    pub fn fail_notify(mut self) -> Self {
        self.fail_notify = true;
        self
    }

    /// Recorded actions in call order.
    pub fn actions(&self) -> Vec<PlatformAction> {
        self.actions.lock().clone()
    }

    /// Notices posted so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.actions
            .lock()
            .iter()
            .filter_map(|a| match a {
                PlatformAction::Notified { notice, .. } => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn delete_message(&self, message: &MessageRef) -> Result<(), PlatformError> {
        if self.deny_delete {
            return Err(PlatformError::Forbidden("manage messages".into()));
        }
        self.actions.lock().push(PlatformAction::Deleted(message.clone()));
        Ok(())
    }

    async fn timeout_member(
        &self,
        community: &CommunityId,
        member: &MemberId,
        duration: Duration,
        reason: &str,
    ) -> Result<(), PlatformError> {
        if self.deny_timeout {
            return Err(PlatformError::Forbidden("moderate members".into()));
        }
        self.actions.lock().push(PlatformAction::TimedOut {
            community: community.clone(),
            member: member.clone(),
            duration,
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn notify(
        &self,
        community: &CommunityId,
        channel: &ChannelId,
        notice: &Notice,
    ) -> Result<(), PlatformError> {
        if self.fail_notify {
            return Err(PlatformError::Other("channel unavailable".into()));
        }
        self.actions.lock().push(PlatformAction::Notified {
            community: community.clone(),
            channel: channel.clone(),
            notice: notice.clone(),
        });
        Ok(())
    }
}

/// Image attachment at `url`.
pub fn image(url: &str) -> Attachment {
    Attachment {
        url: url.to_string(),
        content_type: Some("image/png".to_string()),
    }
}

/// Message `m1` in channel `c1` of `community`, posted by `author`.
pub fn message(community: &str, author: &str, attachments: Vec<Attachment>) -> MessageEvent {
    MessageEvent {
        message_id: "m1".into(),
        channel_id: "c1".into(),
        community_id: Some(community.into()),
        author_id: author.into(),
        author_is_bot: false,
        attachments,
    }
}
