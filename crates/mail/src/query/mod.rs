//! Candidate message queries
//!
//! Resolve mailboxes and change sets into the concrete messages that are
//! still waiting for a reply.

mod unanswered;

pub use unanswered::{
    MAX_BODY_VALUE_BYTES, THREAD_BATCH_SIZE, eligible_from_change_set, fetch_messages,
    find_unanswered_from_change_set, find_unanswered_in_mailbox,
};
