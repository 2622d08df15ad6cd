//! # warden-commands
//!
//! The administrator command group (`:mod` by default).
//!
//! - [`parse_args`]: text to [`Subcommand`]
//! - [`CommandSurface`]: gating, execution against the ledger, and replies

#![deny(unsafe_code)]

pub mod errors;
pub mod parse;
pub mod surface;

pub use errors::CommandError;
pub use parse::{Subcommand, parse_args, parse_member, strip_prefix};
pub use surface::{CommandContext, CommandSurface, LEADERBOARD_SIZE};
