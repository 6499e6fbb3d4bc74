//! Change tracking and reply orchestration
//!
//! Turns push notifications and one-shot polls into per-message reply
//! runs.

mod responder;
mod tracker;

pub use responder::{MessageOutcome, Responder, RunOptions, RunReport, received_after};
pub use tracker::{ChangeSet, ChangeTracker, Phase, Transition, collect_changes};
