//! Line-delimited JSON platform adapter.
//!
//! Inbound events arrive one JSON object per line, tagged by `type`.
//! Platform actions are written back the same way, tagged by `action`.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use warden_core::{
    ChannelId, ChatPlatform, CommunityId, MemberId, MessageEvent, MessageRef, Notice, PlatformError,
};

/// One inbound line.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    /// A message was posted.
    Message(MessageEvent),
    /// Text addressed to the command group.
    Command(CommandEvent),
}

/// A command invocation.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEvent {
    /// Community, or `None` for direct messages.
    #[serde(default)]
    pub community_id: Option<CommunityId>,
    /// Channel the reply goes to.
    pub channel_id: ChannelId,
    /// Invoker.
    pub author_id: MemberId,
    /// Whether the invoker holds administrator permission.
    #[serde(default)]
    pub is_admin: bool,
    /// Raw message text.
    pub text: String,
}

/// One outbound line.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "lowercase", rename_all_fields = "camelCase")]
enum Action<'a> {
    Delete {
        #[serde(flatten)]
        message: &'a MessageRef,
    },
    Timeout {
        community_id: &'a CommunityId,
        member_id: &'a MemberId,
        duration_secs: u64,
        reason: &'a str,
    },
    Notify {
        community_id: &'a CommunityId,
        channel_id: &'a ChannelId,
        notice: &'a Notice,
    },
    Reply {
        #[serde(skip_serializing_if = "Option::is_none")]
        community_id: Option<&'a CommunityId>,
        channel_id: &'a ChannelId,
        notice: &'a Notice,
    },
}

/// Writes platform actions as JSON lines.
pub struct ConsolePlatform {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsolePlatform {
    /// Adapter writing to `out`.
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Adapter writing to stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Post a command reply.
    pub fn reply(
        &self,
        community: Option<&CommunityId>,
        channel: &ChannelId,
        notice: &Notice,
    ) -> Result<(), PlatformError> {
        self.emit(&Action::Reply {
            community_id: community,
            channel_id: channel,
            notice,
        })
    }

    fn emit(&self, action: &Action<'_>) -> Result<(), PlatformError> {
        let line = serde_json::to_string(action).map_err(|e| PlatformError::Other(e.to_string()))?;
        let mut out = self.out.lock();
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| PlatformError::Other(format!("write failed: {e}")))
    }
}

#[async_trait]
impl ChatPlatform for ConsolePlatform {
    async fn delete_message(&self, message: &MessageRef) -> Result<(), PlatformError> {
        self.emit(&Action::Delete { message })
    }

    async fn timeout_member(
        &self,
        community: &CommunityId,
        member: &MemberId,
        duration: Duration,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.emit(&Action::Timeout {
            community_id: community,
            member_id: member,
            duration_secs: duration.as_secs(),
            reason,
        })
    }

    async fn notify(
        &self,
        community: &CommunityId,
        channel: &ChannelId,
        notice: &Notice,
    ) -> Result<(), PlatformError> {
        self.emit(&Action::Notify {
            community_id: community,
            channel_id: channel,
            notice,
        })
    }
}

/// Parse one inbound line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<Inbound, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(serde_json::from_str(line))
    }
}
