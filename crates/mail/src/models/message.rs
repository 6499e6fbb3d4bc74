//! Message model representing a JMAP Email object

use super::{MailboxId, ThreadId, keywords, true_set};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Unique identifier for a message (JMAP Email id)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for MessageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    #[serde(default)]
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com"); empty for group syntax
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.email),
            _ => format!("<{}>", self.email),
        }
    }
}

/// A body part reference (`textBody` / `htmlBody` entries)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyPart {
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
}

impl BodyPart {
    pub fn new(part_id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            part_id: Some(part_id.into()),
            content_type: Some(content_type.into()),
        }
    }
}

/// Decoded content of a body part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_truncated: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_encoding_problem: bool,
}

impl BodyValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_truncated: false,
            is_encoding_problem: false,
        }
    }
}

/// A raw header name/value pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A single email message
///
/// Fields other than `id` are optional on the wire because `Email/get` is
/// often issued with a reduced property list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub thread_id: ThreadId,
    /// Mailboxes this message belongs to
    #[serde(default, with = "true_set")]
    pub mailbox_ids: BTreeSet<MailboxId>,
    /// Keywords such as `$seen` and `$draft`
    #[serde(default, with = "true_set")]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub from: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub cc: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub reply_to: Option<Vec<EmailAddress>>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    /// Message-ID header values (without angle brackets)
    #[serde(default)]
    pub message_id: Option<Vec<String>>,
    #[serde(default)]
    pub in_reply_to: Option<Vec<String>>,
    #[serde(default)]
    pub references: Option<Vec<String>>,
    #[serde(default)]
    pub text_body: Option<Vec<BodyPart>>,
    #[serde(default)]
    pub html_body: Option<Vec<BodyPart>>,
    #[serde(default)]
    pub body_values: Option<HashMap<String, BodyValue>>,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: impl Into<MessageId>, thread_id: impl Into<ThreadId>) -> MessageBuilder {
        MessageBuilder::new(id.into(), thread_id.into())
    }

    pub fn is_seen(&self) -> bool {
        self.keywords.contains(keywords::SEEN)
    }

    pub fn in_mailbox(&self, mailbox_id: &MailboxId) -> bool {
        self.mailbox_ids.contains(mailbox_id)
    }

    /// First From address
    pub fn sender(&self) -> Option<&EmailAddress> {
        self.from.as_deref().and_then(|from| from.first())
    }

    /// Recipients in the To header, in header order
    pub fn recipients(&self) -> &[EmailAddress] {
        self.to.as_deref().unwrap_or_default()
    }

    /// Address a reply should go to: the first Reply-To address if it is
    /// present and non-empty, otherwise the first From address.
    pub fn reply_address(&self) -> Option<&str> {
        let reply_to = self
            .reply_to
            .as_deref()
            .and_then(|r| r.first())
            .map(|a| a.email.as_str())
            .filter(|email| !email.is_empty());
        reply_to.or_else(|| {
            self.sender()
                .map(|a| a.email.as_str())
                .filter(|email| !email.is_empty())
        })
    }

    /// Decoded text of the first text/plain body part
    pub fn text_content(&self) -> Option<&str> {
        self.body_value(self.text_body.as_deref())
    }

    /// Decoded text of the first text/html body part
    pub fn html_content(&self) -> Option<&str> {
        self.body_value(self.html_body.as_deref())
    }

    fn body_value(&self, parts: Option<&[BodyPart]>) -> Option<&str> {
        let part_id = parts?.first()?.part_id.as_deref()?;
        self.body_values
            .as_ref()?
            .get(part_id)
            .map(|v| v.value.as_str())
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    fn new(id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            message: Message {
                id,
                thread_id,
                mailbox_ids: BTreeSet::new(),
                keywords: BTreeSet::new(),
                from: None,
                to: None,
                cc: None,
                reply_to: None,
                subject: None,
                received_at: None,
                message_id: None,
                in_reply_to: None,
                references: None,
                text_body: None,
                html_body: None,
                body_values: None,
            },
        }
    }

    pub fn from(mut self, from: EmailAddress) -> Self {
        self.message.from = Some(vec![from]);
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.message.to = Some(to);
        self
    }

    pub fn cc(mut self, cc: Vec<EmailAddress>) -> Self {
        self.message.cc = Some(cc);
        self
    }

    pub fn reply_to(mut self, reply_to: EmailAddress) -> Self {
        self.message.reply_to = Some(vec![reply_to]);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.message.subject = Some(subject.into());
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.message.received_at = Some(received_at);
        self
    }

    pub fn mailbox(mut self, mailbox_id: impl Into<MailboxId>) -> Self {
        self.message.mailbox_ids.insert(mailbox_id.into());
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.message.keywords.insert(keyword.into());
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message.message_id = Some(vec![message_id.into()]);
        self
    }

    pub fn references(mut self, references: Vec<String>) -> Self {
        self.message.references = Some(references);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.body("text", "text/plain", text.into())
    }

    pub fn html(self, html: impl Into<String>) -> Self {
        self.body("html", "text/html", html.into())
    }

    fn body(mut self, part_id: &str, content_type: &str, value: String) -> Self {
        let part = vec![BodyPart::new(part_id, content_type)];
        if content_type == "text/html" {
            self.message.html_body = Some(part);
        } else {
            self.message.text_body = Some(part);
        }
        self.message
            .body_values
            .get_or_insert_with(HashMap::new)
            .insert(part_id.to_string(), BodyValue::new(value));
        self
    }

    pub fn build(self) -> Message {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_name() {
        let addr = EmailAddress::with_name("John Doe", "john@example.com");
        assert_eq!(addr.display(), "John Doe <john@example.com>");
    }

    #[test]
    fn test_display_without_name() {
        let addr = EmailAddress::new("john@example.com");
        assert_eq!(addr.display(), "<john@example.com>");
    }

    #[test]
    fn test_deserialize_partial_email() {
        let json = r#"{
            "id": "Mdeadbeef",
            "threadId": "Tbeef1",
            "mailboxIds": { "MBX1000": true, "MBX1": false }
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.thread_id.as_str(), "Tbeef1");
        assert!(message.in_mailbox(&MailboxId::new("MBX1000")));
        assert!(!message.in_mailbox(&MailboxId::new("MBX1")));
        assert!(message.keywords.is_empty());
        assert!(message.from.is_none());
    }

    #[test]
    fn test_deserialize_full_email() {
        let json = r#"{
            "id": "Mdeadbeef",
            "threadId": "Tbeef1",
            "mailboxIds": { "MBX1000": true },
            "keywords": { "$seen": true },
            "from": [{ "name": "Paula", "email": "paula@twoson.example.com" }],
            "to": [{ "name": "Ness", "email": "ness@onett.example.com" }],
            "replyTo": null,
            "subject": "Day Trip to Happy Happy Village",
            "receivedAt": "1994-08-24T12:01:02Z",
            "messageId": ["first@ness.onett.example.com"],
            "textBody": [{ "partId": "1", "type": "text/plain" }],
            "htmlBody": [{ "partId": "2", "type": "text/html" }],
            "bodyValues": {
                "1": { "value": "See you there", "isTruncated": false },
                "2": { "value": "<p>See you there</p>", "isTruncated": false }
            }
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert!(message.is_seen());
        assert_eq!(message.reply_address(), Some("paula@twoson.example.com"));
        assert_eq!(message.text_content(), Some("See you there"));
        assert_eq!(message.html_content(), Some("<p>See you there</p>"));
        assert_eq!(message.recipients()[0].email, "ness@onett.example.com");
    }

    #[test]
    fn test_reply_address_prefers_reply_to() {
        let message = Message::builder("M1", "T1")
            .from(EmailAddress::new("paula@twoson.example.com"))
            .reply_to(EmailAddress::new("jeff@winters.example.com"))
            .build();
        assert_eq!(message.reply_address(), Some("jeff@winters.example.com"));
    }

    #[test]
    fn test_reply_address_skips_empty_reply_to() {
        let message = Message::builder("M1", "T1")
            .from(EmailAddress::new("paula@twoson.example.com"))
            .reply_to(EmailAddress::new(""))
            .build();
        assert_eq!(message.reply_address(), Some("paula@twoson.example.com"));

        let nobody = Message::builder("M2", "T2").build();
        assert_eq!(nobody.reply_address(), None);
    }

    #[test]
    fn test_builder_serializes_as_jmap() {
        let message = Message::builder("M1", "T1")
            .mailbox("MBX1000")
            .keyword(keywords::SEEN)
            .text("hello")
            .build();

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["mailboxIds"]["MBX1000"], true);
        assert_eq!(value["keywords"]["$seen"], true);
        assert_eq!(value["textBody"][0]["type"], "text/plain");

        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, message);
    }
}
