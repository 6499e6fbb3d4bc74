//! Mail crate - JMAP auto-reply engine
//!
//! This crate provides the reply engine and everything it talks to:
//! - Domain models (Message, Thread, Mailbox, Identity, state tokens)
//! - JMAP client with typed, reference-chained method batches
//! - Lookup tables for mailboxes and sending identities
//! - Unanswered-message queries for polling and push
//! - Reply and archive actions with a dry-run mode
//! - Change tracking and per-message orchestration
//!
//! All remote calls are synchronous, so the crate works without an async
//! executor.

pub mod actions;
pub mod compose;
pub mod config;
pub mod error;
pub mod jmap;
pub mod lookup;
pub mod models;
pub mod query;
pub mod sync;

pub use actions::{Archiver, DispatchMode, MailboxNames, ReplyDispatcher};
pub use compose::{ComposedReply, QuotingComposer, ReplyComposer};
pub use config::{JmapCredentials, ResponderSettings};
pub use error::{Error, Result};
pub use jmap::{EventStream, JmapApi, JmapClient, ScriptedClient};
pub use lookup::{IdentityMatcher, MailboxResolver};
pub use models::{
    EmailAddress, Identity, Mailbox, MailboxId, Message, MessageId, StateChange, StateToken,
    Thread, ThreadId,
};
pub use sync::{ChangeTracker, MessageOutcome, Responder, RunOptions, RunReport};
