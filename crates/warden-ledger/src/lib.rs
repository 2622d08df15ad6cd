//! # warden-ledger
//!
//! Durable moderation state.
//!
//! - [`ViolationLedger`]: in-memory enablement flags, warning counters and
//!   audit trail, with per-member serialization for enforcement.
//! - [`SnapshotStore`] / [`JsonFileStore`]: crash-safe single-document
//!   persistence with corrupt-document recovery.

#![deny(unsafe_code)]

pub mod error;
pub mod ledger;
pub mod store;

pub use error::StoreError;
pub use ledger::{CommunityStats, MemberGuard, ResetScope, ViolationLedger};
pub use store::{JsonFileStore, LoadOrigin, Loaded, SnapshotStore};
