//! Find messages that still need a reply
//!
//! A message is unanswered when it is the only message in its thread. Two
//! entry points feed the same final fetch: a recency query over one mailbox
//! (polling) and an explicit set of changed message IDs (push).

use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;

use crate::error::Result;
use crate::jmap::api::{GetResponse, response_for};
use crate::jmap::{Batch, EmailGet, EmailQuery, Ids, JmapApi, Method};
use crate::models::{MailboxId, Message, MessageId, Thread, ThreadId};

/// Number of newest threads inspected per mailbox query
pub const THREAD_BATCH_SIZE: usize = 10;

/// Largest body value fetched per part
pub const MAX_BODY_VALUE_BYTES: usize = 1024 * 1024;

/// Properties requested when fetching candidates for a reply
const FULL_PROPERTIES: &[&str] = &[
    "id",
    "threadId",
    "mailboxIds",
    "keywords",
    "from",
    "to",
    "cc",
    "replyTo",
    "subject",
    "receivedAt",
    "messageId",
    "inReplyTo",
    "references",
    "textBody",
    "htmlBody",
    "bodyValues",
];

/// Unanswered messages among the newest `limit` threads of a mailbox
///
/// The query, thread ID lookup and thread fetch go out as one chained
/// request; the eligible messages are then fetched in full.
pub fn find_unanswered_in_mailbox(
    api: &dyn JmapApi,
    mailbox_id: &MailboxId,
    since: Option<DateTime<Utc>>,
    limit: usize,
) -> Result<Vec<Message>> {
    let mut batch = Batch::new();
    let query = batch.push(Method::EmailQuery(EmailQuery {
        in_mailbox: Some(mailbox_id.clone()),
        after: since,
        collapse_threads: true,
        newest_first: true,
        limit: Some(limit),
    }));
    let thread_ids = batch.push(Method::EmailGet(
        EmailGet::new(query.path("/ids")).properties(&["threadId"]),
    ));
    let threads = batch.push(Method::ThreadGet {
        ids: thread_ids.path("/list/*/threadId"),
    });

    let responses = api.call(&batch)?;
    let threads: GetResponse<Thread> = response_for(&responses, &threads)?;
    debug!(
        "Mailbox {} has {} recent threads",
        mailbox_id,
        threads.list.len()
    );

    fetch_messages(api, sole_messages(&threads.list))
}

/// Unanswered messages among `message_ids` that are in `target`
pub fn find_unanswered_from_change_set(
    api: &dyn JmapApi,
    message_ids: &[MessageId],
    target: &MailboxId,
) -> Result<Vec<Message>> {
    let eligible = eligible_from_change_set(api, message_ids, target)?;
    fetch_messages(api, eligible)
}

/// IDs of changed messages in `target` whose thread has no other message
///
/// Mailbox membership is checked locally, so the thread lookup is a
/// second request.
pub fn eligible_from_change_set(
    api: &dyn JmapApi,
    message_ids: &[MessageId],
    target: &MailboxId,
) -> Result<Vec<MessageId>> {
    let ids = distinct(message_ids.iter().cloned());
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut batch = Batch::new();
    let step = batch.push(Method::EmailGet(
        EmailGet::new(Ids::list(&ids)).properties(&["threadId", "mailboxIds"]),
    ));
    let responses = api.call(&batch)?;
    let changed: GetResponse<Message> = response_for(&responses, &step)?;

    let thread_ids: Vec<ThreadId> = distinct(
        changed
            .list
            .into_iter()
            .filter(|m| m.in_mailbox(target) && !m.thread_id.as_str().is_empty())
            .map(|m| m.thread_id),
    );
    if thread_ids.is_empty() {
        debug!("No changed messages in mailbox {}", target);
        return Ok(Vec::new());
    }

    let mut batch = Batch::new();
    let step = batch.push(Method::ThreadGet {
        ids: Ids::list(&thread_ids),
    });
    let responses = api.call(&batch)?;
    let threads: GetResponse<Thread> = response_for(&responses, &step)?;

    Ok(sole_messages(&threads.list))
}

/// Fetch messages in full, including body values
pub fn fetch_messages(api: &dyn JmapApi, ids: Vec<MessageId>) -> Result<Vec<Message>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut batch = Batch::new();
    let step = batch.push(Method::EmailGet(
        EmailGet::new(Ids::list(&ids))
            .properties(FULL_PROPERTIES)
            .with_bodies(MAX_BODY_VALUE_BYTES),
    ));
    let responses = api.call(&batch)?;
    let messages: GetResponse<Message> = response_for(&responses, &step)?;
    debug!("Fetched {} unanswered messages", messages.list.len());
    Ok(messages.list)
}

fn sole_messages(threads: &[Thread]) -> Vec<MessageId> {
    distinct(threads.iter().filter_map(Thread::sole_message).cloned())
}

/// Deduplicate while keeping first-seen order
fn distinct<T, I>(items: I) -> Vec<T>
where
    T: Clone + Eq + std::hash::Hash,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jmap::ScriptedClient;
    use serde_json::json;

    #[test]
    fn test_mailbox_path_keeps_single_message_threads() {
        let client = ScriptedClient::new("u1138");
        client.push_responses([
            ("Email/query", json!({ "ids": ["Mdeadbeef", "Mcafe"] })),
            ("Email/get", json!({ "list": [] })),
            (
                "Thread/get",
                json!({ "list": [
                    { "id": "Tbeef1", "emailIds": ["Mdeadbeef"] },
                    { "id": "Tcafe", "emailIds": ["Mcafe0", "Mcafe"] }
                ] }),
            ),
        ]);
        client.push_responses([(
            "Email/get",
            json!({ "list": [{ "id": "Mdeadbeef", "threadId": "Tbeef1" }] }),
        )]);

        let messages =
            find_unanswered_in_mailbox(&client, &MailboxId::new("MBX50"), None, THREAD_BATCH_SIZE)
                .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.as_str(), "Mdeadbeef");

        let batches = client.batches();
        assert_eq!(
            batches[0].method_names(),
            vec!["Email/query", "Email/get", "Thread/get"]
        );
        let Method::EmailGet(get) = &batches[1].steps()[0] else {
            panic!("expected Email/get");
        };
        assert_eq!(get.ids, Ids::list(["Mdeadbeef"]));
        assert_eq!(get.max_body_value_bytes, Some(1024 * 1024));
        assert!(get.fetch_all_body_values);
    }

    #[test]
    fn test_mailbox_path_with_no_candidates_skips_fetch() {
        let client = ScriptedClient::new("u1");
        client.push_responses([
            ("Email/query", json!({ "ids": [] })),
            ("Email/get", json!({ "list": [] })),
            ("Thread/get", json!({ "list": [] })),
        ]);

        let messages =
            find_unanswered_in_mailbox(&client, &MailboxId::new("MBX50"), None, 10).unwrap();
        assert!(messages.is_empty());
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn test_change_set_filters_by_mailbox() {
        let client = ScriptedClient::new("u1");
        client.push_responses([(
            "Email/get",
            json!({ "list": [
                { "id": "M1", "threadId": "T1", "mailboxIds": { "MBX50": true } },
                { "id": "M2", "threadId": "T2", "mailboxIds": { "MBX1000": true } },
                { "id": "M3", "threadId": "T1", "mailboxIds": { "MBX50": true } }
            ] }),
        )]);
        client.push_responses([(
            "Thread/get",
            json!({ "list": [{ "id": "T1", "emailIds": ["M1"] }] }),
        )]);
        client.push_responses([("Email/get", json!({ "list": [{ "id": "M1" }] }))]);

        let ids = [
            MessageId::new("M1"),
            MessageId::new("M2"),
            MessageId::new("M1"),
            MessageId::new("M3"),
        ];
        let messages =
            find_unanswered_from_change_set(&client, &ids, &MailboxId::new("MBX50")).unwrap();
        assert_eq!(messages.len(), 1);

        let batches = client.batches();
        let Method::EmailGet(get) = &batches[0].steps()[0] else {
            panic!("expected Email/get");
        };
        assert_eq!(get.ids, Ids::list(["M1", "M2", "M3"]));
        assert_eq!(
            batches[1].steps()[0],
            Method::ThreadGet {
                ids: Ids::list(["T1"])
            }
        );
    }

    #[test]
    fn test_change_set_outside_target_makes_one_call() {
        let client = ScriptedClient::new("u1");
        client.push_responses([(
            "Email/get",
            json!({ "list": [{ "id": "M2", "threadId": "T2", "mailboxIds": { "MBX1000": true } }] }),
        )]);

        let messages = find_unanswered_from_change_set(
            &client,
            &[MessageId::new("M2")],
            &MailboxId::new("MBX50"),
        )
        .unwrap();
        assert!(messages.is_empty());
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn test_empty_change_set_makes_no_call() {
        let client = ScriptedClient::new("u1");
        let messages =
            find_unanswered_from_change_set(&client, &[], &MailboxId::new("MBX50")).unwrap();
        assert!(messages.is_empty());
        assert_eq!(client.call_count(), 0);
    }
}
