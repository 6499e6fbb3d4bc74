//! Mark a handled message seen and move it out of the inbox

use log::{debug, info};
use std::sync::Arc;

use super::{DispatchMode, print_dry_run};
use crate::error::{Error, Result};
use crate::jmap::api::{SetResponse, response_for};
use crate::jmap::{Batch, EmailSet, JmapApi, Method, Patch};
use crate::lookup::MailboxResolver;
use crate::models::{MailboxId, Message, keywords};

/// The smallest patch that leaves `message` seen and outside the inbox
pub fn archive_patch(message: &Message, inbox_id: &MailboxId) -> Patch {
    let mut patch = Patch::new();
    if !message.is_seen() {
        patch.set_keyword(keywords::SEEN);
    }
    if message.in_mailbox(inbox_id) {
        patch.remove_mailbox(inbox_id);
    }
    patch
}

pub struct Archiver {
    api: Arc<dyn JmapApi>,
    mailboxes: Arc<MailboxResolver>,
    inbox_name: String,
    mode: DispatchMode,
}

impl Archiver {
    pub fn new(
        api: Arc<dyn JmapApi>,
        mailboxes: Arc<MailboxResolver>,
        inbox_name: impl Into<String>,
        mode: DispatchMode,
    ) -> Self {
        Self {
            api,
            mailboxes,
            inbox_name: inbox_name.into(),
            mode,
        }
    }

    /// Archive a message
    ///
    /// Returns whether an update was needed. A message that is already
    /// seen and outside the inbox causes no request at all.
    pub fn archive(&self, message: &Message) -> Result<bool> {
        if message.id.as_str().is_empty() {
            return Ok(false);
        }

        let inbox = self.mailboxes.require(&self.inbox_name)?;
        let patch = archive_patch(message, &inbox.id);
        if patch.is_empty() {
            debug!("Message {} is already archived", message.id);
            return Ok(false);
        }

        let mut batch = Batch::new();
        let step = batch.push(Method::EmailSet(EmailSet::update(
            message.id.clone(),
            patch,
        )));

        if !self.mode.is_live() {
            print_dry_run(&batch.render(self.api.account_id())?);
            return Ok(true);
        }

        let responses = self.api.call(&batch)?;
        let set: SetResponse = response_for(&responses, &step)?;
        if let Some(err) = set
            .not_updated
            .as_ref()
            .and_then(|failed| failed.get(message.id.as_str()))
        {
            return Err(Error::protocol(format!(
                "Failed to archive message {}: {}",
                message.id, err
            )));
        }

        info!("Archived message {}", message.id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jmap::ScriptedClient;
    use serde_json::json;

    const INBOX: &str = "MBX1000";

    fn setup(mode: DispatchMode) -> (Arc<ScriptedClient>, Archiver) {
        let client = Arc::new(ScriptedClient::new("u1138"));
        client.push_responses([
            ("Mailbox/query", json!({ "ids": [INBOX] })),
            ("Mailbox/get", json!({ "list": [{ "id": INBOX, "name": "Inbox" }] })),
        ]);
        let mailboxes = Arc::new(MailboxResolver::new(client.clone()));
        let archiver = Archiver::new(client.clone(), mailboxes, "Inbox", mode);
        (client, archiver)
    }

    #[test]
    fn test_patch_is_minimal() {
        let inbox = MailboxId::new(INBOX);
        let unread_in_inbox = Message::builder("M1", "T1").mailbox(INBOX).build();
        let patch = archive_patch(&unread_in_inbox, &inbox);
        assert_eq!(patch.len(), 2);
        assert_eq!(patch.get("keywords/$seen"), Some(&json!(true)));
        assert_eq!(patch.get("mailboxIds/MBX1000"), Some(&json!(null)));

        let read_in_inbox = Message::builder("M2", "T2")
            .mailbox(INBOX)
            .keyword(keywords::SEEN)
            .build();
        let patch = archive_patch(&read_in_inbox, &inbox);
        assert_eq!(patch.len(), 1);
        assert!(patch.get("keywords/$seen").is_none());

        let done = Message::builder("M3", "T3")
            .mailbox("MBX50")
            .keyword(keywords::SEEN)
            .build();
        assert!(archive_patch(&done, &inbox).is_empty());
    }

    #[test]
    fn test_archived_message_makes_no_update() {
        let (client, archiver) = setup(DispatchMode::Live);
        let message = Message::builder("M1", "T1")
            .mailbox("MBX50")
            .keyword(keywords::SEEN)
            .build();

        assert!(!archiver.archive(&message).unwrap());
        assert_eq!(client.batches().len(), 1);
        assert!(!client.batches()[0].is_mutating());
    }

    #[test]
    fn test_live_archive() {
        let (client, archiver) = setup(DispatchMode::Live);
        client.push_responses([(
            "Email/set",
            json!({ "accountId": "u1138", "newState": "2", "updated": { "M1": null } }),
        )]);
        let message = Message::builder("M1", "T1").mailbox(INBOX).build();

        assert!(archiver.archive(&message).unwrap());
        let batch = &client.batches()[1];
        let Method::EmailSet(set) = &batch.steps()[0] else {
            panic!("expected Email/set");
        };
        assert_eq!(set.update.len(), 1);
        assert!(set.create.is_empty());
    }

    #[test]
    fn test_not_updated_is_protocol_error() {
        let (client, archiver) = setup(DispatchMode::Live);
        client.push_responses([(
            "Email/set",
            json!({ "notUpdated": { "M1": { "type": "notFound" } } }),
        )]);
        let message = Message::builder("M1", "T1").mailbox(INBOX).build();

        let err = archiver.archive(&message).unwrap_err();
        assert!(err.is_protocol());
        assert!(err.to_string().contains("notFound"));
    }

    #[test]
    fn test_dry_run_does_not_submit() {
        let (client, archiver) = setup(DispatchMode::DryRun);
        let message = Message::builder("M1", "T1").mailbox(INBOX).build();

        assert!(archiver.archive(&message).unwrap());
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn test_empty_id_is_skipped() {
        let (client, archiver) = setup(DispatchMode::Live);
        let message = Message::builder("", "T1").mailbox(INBOX).build();
        assert!(!archiver.archive(&message).unwrap());
        assert_eq!(client.call_count(), 0);
    }

    fn message_in(seen: bool, in_inbox: bool) -> Message {
        let mailbox = if in_inbox { INBOX } else { "MBX50" };
        let mut builder = Message::builder("M1", "T1").mailbox(mailbox);
        if seen {
            builder = builder.keyword(keywords::SEEN);
        }
        builder.build()
    }

    #[test]
    fn test_dry_run_never_mutates_any_state() {
        for seen in [false, true] {
            for in_inbox in [false, true] {
                let (client, archiver) = setup(DispatchMode::DryRun);
                let needed = archiver.archive(&message_in(seen, in_inbox)).unwrap();

                assert_eq!(needed, !seen || in_inbox, "seen={seen} in_inbox={in_inbox}");
                assert!(
                    client.batches().iter().all(|b| !b.is_mutating()),
                    "seen={seen} in_inbox={in_inbox}"
                );
            }
        }
    }

    #[test]
    fn test_archive_twice_equals_once() {
        let mutations = |client: &ScriptedClient| {
            client
                .batches()
                .into_iter()
                .filter(|b| b.is_mutating())
                .map(|b| b.to_request("u1138").unwrap())
                .collect::<Vec<_>>()
        };
        let updated = json!({ "updated": { "M1": null } });

        let (once, archiver) = setup(DispatchMode::Live);
        once.push_responses([("Email/set", updated.clone())]);
        assert!(archiver.archive(&message_in(false, true)).unwrap());

        let (twice, archiver) = setup(DispatchMode::Live);
        twice.push_responses([("Email/set", updated)]);
        assert!(archiver.archive(&message_in(false, true)).unwrap());
        // Second call sees the state the first one left behind
        assert!(!archiver.archive(&message_in(true, false)).unwrap());

        assert_eq!(mutations(once.as_ref()), mutations(twice.as_ref()));
        assert_eq!(mutations(twice.as_ref()).len(), 1);
        assert_eq!(twice.pending(), 0);
    }
}
