//! # warden-enforcement
//!
//! Turns inbound messages into moderation actions.
//!
//! - [`EnforcementPipeline`]: guards, classification, first-violation-wins
//!   enforcement, audit and persistence
//! - [`Dispatcher`]: one task per message with a concurrency cap
//! - [`HttpClassifier`]: the classifier service binding
//! - [`testutil`]: in-memory collaborators

#![deny(unsafe_code)]

pub mod classifier;
pub mod dispatcher;
pub mod notice;
pub mod pipeline;
pub mod testutil;

pub use classifier::{HttpClassifier, UnconfiguredClassifier};
pub use dispatcher::Dispatcher;
pub use notice::violation_notice;
pub use pipeline::{
    EnforcementPipeline, IgnoreReason, Outcome, PipelineConfig, ScanSummary, ViolationRecord,
};
