//! External collaborator boundary.
//!
//! The chat platform and the image classifier are not part of this
//! workspace. They are reached only through [`ChatPlatform`] and
//! [`Classifier`]; production adapters and test mocks implement them.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{ClassifyError, PlatformError};
use crate::ids::{ChannelId, CommunityId, MemberId, MessageId};
use crate::notice::Notice;

/// One attachment on an inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Resource locator handed to the classifier.
    pub url: String,
    /// Content-type hint from the platform, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Attachment {
    /// Whether the content-type hint marks this as an image.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("image"))
    }
}

/// Where a message lives, for deletion and for posting notices back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    /// Community the message was posted in.
    pub community_id: CommunityId,
    /// Channel the message was posted in.
    pub channel_id: ChannelId,
    /// The message itself.
    pub message_id: MessageId,
}

/// A message-arrived event from the platform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Message identifier.
    pub message_id: MessageId,
    /// Channel the message was posted in.
    pub channel_id: ChannelId,
    /// Community, or `None` for direct messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community_id: Option<CommunityId>,
    /// Author of the message.
    pub author_id: MemberId,
    /// Whether the author is an automated account.
    #[serde(default)]
    pub author_is_bot: bool,
    /// Attachments in arrival order.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageEvent {
    /// Reference to this message, if it was posted in a community.
    #[must_use]
    pub fn message_ref(&self) -> Option<MessageRef> {
        self.community_id.as_ref().map(|community_id| MessageRef {
            community_id: community_id.clone(),
            channel_id: self.channel_id.clone(),
            message_id: self.message_id.clone(),
        })
    }
}

/// Image risk classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Score the resource at `locator`; a score in `[0, 1]` or a failure.
    async fn classify(&self, locator: &str) -> Result<f64, ClassifyError>;
}

/// Chat platform side effects.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Delete a message.
    async fn delete_message(&self, message: &MessageRef) -> Result<(), PlatformError>;

    /// Time out a member for `duration`.
    async fn timeout_member(
        &self,
        community: &CommunityId,
        member: &MemberId,
        duration: Duration,
        reason: &str,
    ) -> Result<(), PlatformError>;

    /// Post a structured notice to a channel of a community.
    async fn notify(
        &self,
        community: &CommunityId,
        channel: &ChannelId,
        notice: &Notice,
    ) -> Result<(), PlatformError>;
}
