//! Command errors.

use thiserror::Error;
use warden_core::{FailureClass, Notice, Tone};

/// A command was refused. Nothing was changed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Unknown subcommand, malformed member, or extra arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Issued outside a community.
    #[error("this command can only be used in a server")]
    NotInCommunity,
    /// Issued by a non-administrator.
    #[error("administrator permission required")]
    AccessDenied,
}

impl CommandError {
    /// Every refusal is invalid administrative input.
    pub fn failure_class(&self) -> FailureClass {
        FailureClass::InvalidInput
    }

    /// Reply shown to the invoker.
    pub fn to_notice(&self, prefix: &str) -> Notice {
        match self {
            Self::InvalidArgument(detail) => Notice::new("Invalid Command", Tone::Danger)
                .description(detail.clone())
                .footer(format!("Use `{prefix} help` for the command list")),
            Self::NotInCommunity => Notice::new("Server Only", Tone::Danger)
                .description("This command can only be used in a server."),
            Self::AccessDenied => Notice::new("Access Denied", Tone::Danger).description(
                "You need **Administrator** permissions to use moderation commands.",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_are_danger_toned() {
        for err in [
            CommandError::InvalidArgument("x".into()),
            CommandError::NotInCommunity,
            CommandError::AccessDenied,
        ] {
            assert_eq!(err.to_notice(":mod").tone, Tone::Danger);
            assert_eq!(err.failure_class(), FailureClass::InvalidInput);
        }
    }

    #[test]
    fn invalid_argument_points_to_help() {
        let n = CommandError::InvalidArgument("unknown subcommand `nuke`".into()).to_notice("!mod");
        assert_eq!(n.footer.as_deref(), Some("Use `!mod help` for the command list"));
    }
}
