//! Command execution against the ledger.
//!
//! Every subcommand is administrator-gated and only valid inside a community.
//! Mutating subcommands persist the ledger before replying; a failed save is
//! reported in the reply but does not undo the change.

use std::sync::Arc;

use tracing::{Instrument, field, info, info_span, warn};
use warden_core::escalation::{format_duration, timeout_for};
use warden_core::{CommunityId, MemberId, Notice, Tone, VIOLATION_THRESHOLD};
use warden_ledger::{ResetScope, ViolationLedger};

use crate::errors::CommandError;
use crate::parse::{Subcommand, parse_args, strip_prefix};

/// Rows shown in the warnings leaderboard.
pub const LEADERBOARD_SIZE: usize = 10;

/// Who issued a command, and where.
#[derive(Clone, Debug)]
pub struct CommandContext {
    /// Community the command was issued in; `None` for direct messages.
    pub community: Option<CommunityId>,
    /// Member who issued it.
    pub invoker: MemberId,
    /// Whether the invoker holds administrator permission there.
    pub is_admin: bool,
}

/// The `mod` command group.
pub struct CommandSurface {
    ledger: Arc<ViolationLedger>,
    prefix: String,
    threshold: f64,
}

impl CommandSurface {
    /// Command group triggered by `prefix`.
    pub fn new(ledger: Arc<ViolationLedger>, prefix: impl Into<String>) -> Self {
        Self {
            ledger,
            prefix: prefix.into(),
            threshold: VIOLATION_THRESHOLD,
        }
    }

    /// Trigger token.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reply to `text`, or `None` if it is not addressed to this group.
    pub async fn handle(&self, ctx: &CommandContext, text: &str) -> Option<Notice> {
        let args = strip_prefix(&self.prefix, text)?;
        let span = info_span!(
            "command",
            component = "commands",
            community_id = field::Empty,
            member_id = %ctx.invoker,
        );
        if let Some(ref community) = ctx.community {
            let _ = span.record("community_id", community.as_str());
        }
        let reply = async {
            match self.run(ctx, args).await {
                Ok(notice) => notice,
                Err(e) => {
                    info!(error = %e, failure_class = %e.failure_class(), "command refused");
                    e.to_notice(&self.prefix)
                }
            }
        }
        .instrument(span)
        .await;
        Some(reply)
    }

    async fn run(&self, ctx: &CommandContext, args: &str) -> Result<Notice, CommandError> {
        let community = ctx.community.as_ref().ok_or(CommandError::NotInCommunity)?;
        if !ctx.is_admin {
            return Err(CommandError::AccessDenied);
        }
        let sub = parse_args(args)?;
        Ok(self.execute(community, &ctx.invoker, sub).await)
    }

    /// Execute an already authorized subcommand.
    pub async fn execute(&self, community: &CommunityId, invoker: &MemberId, sub: Subcommand) -> Notice {
        let mutating = sub.is_mutating();
        let reply = match sub {
            Subcommand::Overview => self.overview(community),
            Subcommand::Enable => {
                self.ledger.set_enabled(community, true);
                info!(community_id = %community, invoker = %invoker, "moderation enabled");
                Notice::new("Moderation Enabled", Tone::Success)
                    .description("Image moderation system is now **ACTIVE** in this server")
                    .field("Status", status_label(true))
                    .field("NSFW Threshold", self.threshold_label())
                    .field("Action", "Scanning all images for NSFW content")
            }
            Subcommand::Disable => {
                self.ledger.set_enabled(community, false);
                info!(community_id = %community, invoker = %invoker, "moderation disabled");
                Notice::new("Moderation Disabled", Tone::Warning)
                    .description("Image moderation system is now **INACTIVE** in this server")
                    .field("Status", status_label(false))
                    .field("Action", "No images will be scanned")
            }
            Subcommand::Status => self.status(community),
            Subcommand::Warnings(Some(member)) => self.member_warnings(community, &member),
            Subcommand::Warnings(None) => self.leaderboard(community),
            Subcommand::Reset(Some(member)) => {
                let _guard = self.ledger.lock_member(community, &member).await;
                let _ = self
                    .ledger
                    .reset_warnings(&ResetScope::Member(community.clone(), member.clone()));
                info!(community_id = %community, member_id = %member, invoker = %invoker, "member warnings reset");
                Notice::new("Warnings Reset", Tone::Success)
                    .description(format!("Warnings have been reset for {}", member.mention()))
            }
            Subcommand::Reset(None) => {
                let cleared = self
                    .ledger
                    .reset_warnings(&ResetScope::Community(community.clone()));
                info!(community_id = %community, cleared, invoker = %invoker, "community warnings reset");
                Notice::new("All Warnings Reset", Tone::Success)
                    .description("All warnings have been reset in this server")
            }
            Subcommand::Help => self.help(),
        };

        if mutating {
            if let Err(e) = self.ledger.persist().await {
                warn!(community_id = %community, error = %e, "command change not saved");
                return reply.wide_field(
                    "Not Saved",
                    "The change is active but could not be written to disk; it will be saved with the next change.",
                );
            }
        }
        reply
    }

    fn overview(&self, community: &CommunityId) -> Notice {
        let stats = self.ledger.community_stats(community);
        Notice::new("Image Moderation System", Tone::Info)
            .description("AI-powered content moderation for this server")
            .field("Server Status", status_label(self.ledger.is_enabled(community)))
            .field("NSFW Threshold", self.threshold_label())
            .field("Active Warnings", format!("`{}`", stats.warned_members))
            .wide_field("Available Commands", self.command_list())
            .footer("All commands require Administrator permissions")
    }

    fn status(&self, community: &CommunityId) -> Notice {
        let stats = self.ledger.community_stats(community);
        Notice::new("Moderation System Status", Tone::Info)
            .field("System Status", status_label(self.ledger.is_enabled(community)))
            .field("NSFW Threshold", self.threshold_label())
            .field("Total Warnings", format!("`{}`", stats.total_warnings))
            .field("Warned Users", format!("`{}`", stats.warned_members))
    }

    fn member_warnings(&self, community: &CommunityId, member: &MemberId) -> Notice {
        let count = self.ledger.get_warning_count(community, member);
        let notice = Notice::new("Member Warnings", Tone::Warning)
            .field("User", member.mention())
            .field("Warnings", format!("`{count}`"));
        if count > 0 {
            notice.field("Next Timeout", format_duration(timeout_for(count.saturating_add(1))))
        } else {
            notice
        }
    }

    fn leaderboard(&self, community: &CommunityId) -> Notice {
        let rows = self.ledger.community_warnings(community);
        if rows.is_empty() {
            return Notice::new("No Warnings", Tone::Info)
                .description("No warnings recorded in this server.");
        }
        rows.into_iter().take(LEADERBOARD_SIZE).fold(
            Notice::new("User Warning Leaderboard", Tone::Warning)
                .description("Top warned users in this server"),
            |notice, (member, count)| {
                notice.wide_field(
                    member.mention(),
                    format!(
                        "Warnings: `{count}` | Timeout: `{}`",
                        format_duration(timeout_for(count))
                    ),
                )
            },
        )
    }

    fn help(&self) -> Notice {
        Notice::new("Moderation Commands", Tone::Info)
            .wide_field("Commands", self.command_list())
            .footer("All commands require Administrator permissions")
    }

    fn command_list(&self) -> String {
        let p = &self.prefix;
        [
            format!("`{p} enable` - Enable moderation in this server"),
            format!("`{p} disable` - Disable moderation in this server"),
            format!("`{p} status` - Server status"),
            format!("`{p} warnings [user]` - Check warnings"),
            format!("`{p} reset [user]` - Reset warnings"),
            format!("`{p} help` - Command help"),
        ]
        .join("\n")
    }

    fn threshold_label(&self) -> String {
        format!("`{}`", self.threshold)
    }
}

fn status_label(enabled: bool) -> &'static str {
    if enabled { "🟢 **ENABLED**" } else { "🔴 **DISABLED**" }
}
