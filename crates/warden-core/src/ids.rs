//! Branded ID newtypes for type safety.
//!
//! Community, member, channel and message identifiers come from the chat
//! platform and are opaque strings. Wrapping each in its own newtype keeps a
//! member ID from being passed where a community ID is expected, which matters
//! because the ledger is keyed by `(community, member)` pairs.
//!
//! [`AuditEntryId`] is the only identifier minted locally (UUID v7,
//! time-ordered).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// An independent community (guild/server) under which enforcement is tracked.
    CommunityId
}

branded_id! {
    /// A user identity. Warning counts are scoped by community.
    MemberId
}

branded_id! {
    /// A channel inside a community; notices are posted back to it.
    ChannelId
}

branded_id! {
    /// A single chat message.
    MessageId
}

branded_id! {
    /// Unique identifier for an audit entry.
    AuditEntryId
}

impl AuditEntryId {
    /// Create a new random ID (UUID v7, time-ordered).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for AuditEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberId {
    /// Render as a platform mention (`<@id>`).
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

/// Ledger key: one member inside one community.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberKey {
    /// Community scope.
    pub community: CommunityId,
    /// Member within the community.
    pub member: MemberId,
}

impl MemberKey {
    /// Build a key from borrowed IDs.
    #[must_use]
    pub fn new(community: &CommunityId, member: &MemberId) -> Self {
        Self {
            community: community.clone(),
            member: member.clone(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.community, self.member)
    }
}
