//! Thread model representing a JMAP thread (conversation)

use serde::{Deserialize, Serialize};

use super::MessageId;

/// Unique identifier for a thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ThreadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A thread holds the ordered IDs of the messages in one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: ThreadId,
    /// Message IDs, oldest first
    #[serde(default)]
    pub email_ids: Vec<MessageId>,
}

impl Thread {
    pub fn new(id: impl Into<ThreadId>, email_ids: Vec<MessageId>) -> Self {
        Self {
            id: id.into(),
            email_ids,
        }
    }

    /// A thread with exactly one message has not been answered yet.
    ///
    /// Any thread with two or more messages counts as answered, even when
    /// none of them is actually a reply.
    pub fn awaiting_reply(&self) -> bool {
        self.email_ids.len() == 1
    }

    /// The lone message of an unanswered thread
    pub fn sole_message(&self) -> Option<&MessageId> {
        if self.awaiting_reply() {
            self.email_ids.first()
        } else {
            None
        }
    }
}
