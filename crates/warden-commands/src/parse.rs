//! Command-line parsing for the `mod` group.
//!
//! ```text
//! <prefix>                    overview
//! <prefix> enable | disable | status | help
//! <prefix> warnings [member]
//! <prefix> reset [member]
//! ```
//!
//! A member is a mention (`<@id>`, `<@!id>`) or a raw id.

use warden_core::MemberId;

use crate::errors::CommandError;

/// One parsed subcommand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Subcommand {
    /// Bare group: status overview and command list.
    Overview,
    /// Turn enforcement on.
    Enable,
    /// Turn enforcement off.
    Disable,
    /// Community statistics.
    Status,
    /// One member's count, or the leaderboard.
    Warnings(Option<MemberId>),
    /// Reset one member, or the whole community.
    Reset(Option<MemberId>),
    /// Command list.
    Help,
}

impl Subcommand {
    /// Whether executing this changes the ledger.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Enable | Self::Disable | Self::Reset(_))
    }
}

/// Arguments after the prefix, when `text` starts with the `prefix` token.
pub fn strip_prefix<'a>(prefix: &str, text: &'a str) -> Option<&'a str> {
    let text = text.trim_start();
    let rest = text.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Parse the arguments that follow the prefix.
pub fn parse_args(args: &str) -> Result<Subcommand, CommandError> {
    let mut tokens = args.split_whitespace();
    let Some(name) = tokens.next() else {
        return Ok(Subcommand::Overview);
    };
    let member = tokens.next().map(parse_member).transpose()?;
    if let Some(extra) = tokens.next() {
        return Err(CommandError::InvalidArgument(format!(
            "unexpected argument `{extra}`"
        )));
    }

    let sub = match name.to_ascii_lowercase().as_str() {
        "enable" => Subcommand::Enable,
        "disable" => Subcommand::Disable,
        "status" => Subcommand::Status,
        "help" => Subcommand::Help,
        "warnings" => return Ok(Subcommand::Warnings(member)),
        "reset" => return Ok(Subcommand::Reset(member)),
        other => {
            return Err(CommandError::InvalidArgument(format!(
                "unknown subcommand `{other}`"
            )));
        }
    };
    match member {
        Some(m) => Err(CommandError::InvalidArgument(format!(
            "`{name}` takes no member argument (got `{m}`)"
        ))),
        None => Ok(sub),
    }
}

/// Parse a member mention or raw id.
pub fn parse_member(token: &str) -> Result<MemberId, CommandError> {
    let id = token
        .strip_prefix("<@")
        .and_then(|rest| rest.strip_suffix('>'))
        .map_or(token, |inner| inner.strip_prefix('!').unwrap_or(inner));

    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(MemberId::from(id))
    } else {
        Err(CommandError::InvalidArgument(format!(
            "`{token}` is not a member mention or id"
        )))
    }
}
