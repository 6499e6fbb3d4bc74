//! Mailbox model (JMAP's folder/label)

use serde::{Deserialize, Serialize};

/// Unique identifier for a mailbox
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailboxId(pub String);

impl MailboxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MailboxId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&MailboxId> for MailboxId {
    fn from(id: &MailboxId) -> Self {
        id.clone()
    }
}

impl std::fmt::Display for MailboxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A mailbox as returned by `Mailbox/get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mailbox {
    pub id: MailboxId,
    pub name: String,
    /// Server-assigned role such as "inbox", "drafts" or "sent"
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parent_id: Option<MailboxId>,
    #[serde(default)]
    pub total_emails: u64,
    #[serde(default)]
    pub unread_emails: u64,
    #[serde(default)]
    pub total_threads: u64,
    #[serde(default)]
    pub unread_threads: u64,
}

impl Mailbox {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: MailboxId::new(id),
            name: name.into(),
            role: None,
            parent_id: None,
            total_emails: 0,
            unread_emails: 0,
            total_threads: 0,
            unread_threads: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_mailbox() {
        let json = r#"{
            "id": "MBX50",
            "name": "pigeonhole",
            "role": null,
            "parentId": null,
            "totalEmails": 12,
            "unreadEmails": 3,
            "totalThreads": 10,
            "unreadThreads": 2,
            "sortOrder": 0
        }"#;

        let mailbox: Mailbox = serde_json::from_str(json).unwrap();
        assert_eq!(mailbox.id, MailboxId::new("MBX50"));
        assert_eq!(mailbox.name, "pigeonhole");
        assert_eq!(mailbox.unread_emails, 3);
        assert!(mailbox.role.is_none());
    }
}
