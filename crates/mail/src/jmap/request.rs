//! Typed JMAP method batches
//!
//! A `Batch` is an ordered list of method steps. A step's `ids` argument is
//! either a literal list or a `ResultRef` pointing at the output of an
//! earlier step in the same batch, so a whole lookup chain can be declared
//! up front and submitted as a single request. References may only point
//! backward, which keeps every batch acyclic.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, BTreeSet};

use super::capabilities;
use crate::error::{Error, Result};
use crate::models::{
    BodyPart, BodyValue, EmailAddress, Header, IdentityId, MailboxId, MessageId, StateToken,
    keywords, true_set,
};

/// Handle to a step that has been pushed onto a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRef {
    index: usize,
    name: &'static str,
}

impl StepRef {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Call ID used for this step on the wire
    pub fn call_id(&self) -> String {
        self.index.to_string()
    }

    /// Reference the value at `path` in this step's result
    pub fn path(&self, path: impl Into<String>) -> Ids {
        Ids::Ref(ResultRef {
            result_of: self.index,
            name: self.name,
            path: path.into(),
        })
    }
}

/// A back-reference to the result of an earlier step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRef {
    pub result_of: usize,
    pub name: &'static str,
    pub path: String,
}

impl ResultRef {
    fn to_json(&self) -> Value {
        json!({
            "resultOf": self.result_of.to_string(),
            "name": self.name,
            "path": self.path,
        })
    }
}

/// The `ids` argument of a `/get` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ids {
    List(Vec<String>),
    Ref(ResultRef),
}

impl Ids {
    pub fn list<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::List(ids.into_iter().map(|s| s.as_ref().to_string()).collect())
    }

    fn reference(&self) -> Option<&ResultRef> {
        match self {
            Self::Ref(r) => Some(r),
            Self::List(_) => None,
        }
    }

    fn insert_into(&self, args: &mut Map<String, Value>) {
        match self {
            Self::List(ids) => {
                args.insert("ids".to_string(), json!(ids));
            }
            Self::Ref(r) => {
                args.insert("#ids".to_string(), r.to_json());
            }
        }
    }
}

/// Arguments for `Email/query`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmailQuery {
    pub in_mailbox: Option<MailboxId>,
    /// Only messages received after this instant
    pub after: Option<DateTime<Utc>>,
    pub collapse_threads: bool,
    /// Sort by `receivedAt` descending
    pub newest_first: bool,
    pub limit: Option<usize>,
}

/// Arguments for `Email/get`
#[derive(Debug, Clone, PartialEq)]
pub struct EmailGet {
    pub ids: Ids,
    pub properties: Option<Vec<&'static str>>,
    pub fetch_all_body_values: bool,
    pub max_body_value_bytes: Option<usize>,
}

impl EmailGet {
    pub fn new(ids: Ids) -> Self {
        Self {
            ids,
            properties: None,
            fetch_all_body_values: false,
            max_body_value_bytes: None,
        }
    }

    pub fn properties(mut self, properties: &[&'static str]) -> Self {
        self.properties = Some(properties.to_vec());
        self
    }

    /// Fetch every body value, truncating each to `max_bytes`
    pub fn with_bodies(mut self, max_bytes: usize) -> Self {
        self.fetch_all_body_values = true;
        self.max_body_value_bytes = Some(max_bytes);
        self
    }
}

/// A property patch for `/set` updates, keyed by JSON pointer path.
/// A `null` value removes the property.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Patch(BTreeMap<String, Value>);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_keyword(&mut self, keyword: &str) -> &mut Self {
        self.0.insert(format!("keywords/{keyword}"), Value::Bool(true));
        self
    }

    pub fn clear_keyword(&mut self, keyword: &str) -> &mut Self {
        self.0.insert(format!("keywords/{keyword}"), Value::Null);
        self
    }

    pub fn add_mailbox(&mut self, mailbox_id: &MailboxId) -> &mut Self {
        self.0.insert(format!("mailboxIds/{mailbox_id}"), Value::Bool(true));
        self
    }

    pub fn remove_mailbox(&mut self, mailbox_id: &MailboxId) -> &mut Self {
        self.0.insert(format!("mailboxIds/{mailbox_id}"), Value::Null);
        self
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A message to create with `Email/set`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftEmail {
    #[serde(with = "true_set")]
    pub mailbox_ids: BTreeSet<MailboxId>,
    #[serde(with = "true_set")]
    pub keywords: BTreeSet<String>,
    pub from: Vec<EmailAddress>,
    pub to: Vec<EmailAddress>,
    pub subject: String,
    pub message_id: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub in_reply_to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<Header>,
    pub body_values: BTreeMap<String, BodyValue>,
    pub text_body: Vec<BodyPart>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub html_body: Vec<BodyPart>,
}

impl DraftEmail {
    /// Part ID of the text/plain body
    pub const TEXT_PART: &'static str = "text";
    /// Part ID of the text/html body
    pub const HTML_PART: &'static str = "html";

    /// A draft in `drafts` carrying a text body and an optional HTML body
    pub fn new(drafts: &MailboxId, text_body: &str, html_body: Option<&str>) -> Self {
        let mut body_values = BTreeMap::new();
        body_values.insert(Self::TEXT_PART.to_string(), BodyValue::new(text_body));
        let mut html_parts = Vec::new();
        if let Some(html) = html_body {
            body_values.insert(Self::HTML_PART.to_string(), BodyValue::new(html));
            html_parts.push(BodyPart::new(Self::HTML_PART, "text/html"));
        }

        Self {
            mailbox_ids: BTreeSet::from([drafts.clone()]),
            keywords: BTreeSet::from([keywords::DRAFT.to_string()]),
            from: Vec::new(),
            to: Vec::new(),
            subject: String::new(),
            message_id: Vec::new(),
            in_reply_to: Vec::new(),
            references: Vec::new(),
            headers: Vec::new(),
            body_values,
            text_body: vec![BodyPart::new(Self::TEXT_PART, "text/plain")],
            html_body: html_parts,
        }
    }
}

/// Arguments for `Email/set`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmailSet {
    pub create: BTreeMap<String, DraftEmail>,
    pub update: BTreeMap<MessageId, Patch>,
    pub destroy: Vec<MessageId>,
}

impl EmailSet {
    pub fn update(id: MessageId, patch: Patch) -> Self {
        let mut set = Self::default();
        set.update.insert(id, patch);
        set
    }

    pub fn create(creation_id: impl Into<String>, draft: DraftEmail) -> Self {
        let mut set = Self::default();
        set.create.insert(creation_id.into(), draft);
        set
    }
}

/// SMTP envelope address
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvelopeAddress {
    pub email: String,
}

/// SMTP envelope for a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub mail_from: EnvelopeAddress,
    pub rcpt_to: Vec<EnvelopeAddress>,
}

impl Envelope {
    pub fn new(mail_from: &str, rcpt_to: &[&str]) -> Self {
        Self {
            mail_from: EnvelopeAddress {
                email: mail_from.to_string(),
            },
            rcpt_to: rcpt_to
                .iter()
                .map(|email| EnvelopeAddress {
                    email: email.to_string(),
                })
                .collect(),
        }
    }
}

/// An `EmailSubmission` to create
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionCreate {
    /// Email ID or `#creationId` of a message created earlier in the batch
    pub email_id: String,
    pub identity_id: IdentityId,
    pub envelope: Envelope,
}

/// Mutation the server applies to the submitted message once sending succeeds
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OnSuccess {
    #[default]
    Nothing,
    /// Patches keyed by `#submissionCreationId`
    UpdateEmail(BTreeMap<String, Patch>),
    /// `#submissionCreationId`s whose messages are destroyed
    DestroyEmail(Vec<String>),
}

/// Arguments for `EmailSubmission/set`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubmissionSet {
    pub create: BTreeMap<String, SubmissionCreate>,
    pub on_success: OnSuccess,
}

/// One typed method call
#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    MailboxQuery { name: String },
    MailboxGet { ids: Ids },
    EmailQuery(EmailQuery),
    EmailGet(EmailGet),
    EmailChanges {
        since_state: StateToken,
        max_changes: Option<usize>,
    },
    EmailSet(EmailSet),
    ThreadGet { ids: Ids },
    IdentityGet,
    EmailSubmissionSet(SubmissionSet),
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MailboxQuery { .. } => "Mailbox/query",
            Self::MailboxGet { .. } => "Mailbox/get",
            Self::EmailQuery(_) => "Email/query",
            Self::EmailGet(_) => "Email/get",
            Self::EmailChanges { .. } => "Email/changes",
            Self::EmailSet(_) => "Email/set",
            Self::ThreadGet { .. } => "Thread/get",
            Self::IdentityGet => "Identity/get",
            Self::EmailSubmissionSet(_) => "EmailSubmission/set",
        }
    }

    /// Whether the call changes server state
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::EmailSet(_) | Self::EmailSubmissionSet(_))
    }

    fn reference(&self) -> Option<&ResultRef> {
        match self {
            Self::MailboxGet { ids } | Self::ThreadGet { ids } => ids.reference(),
            Self::EmailGet(get) => get.ids.reference(),
            _ => None,
        }
    }

    /// Build the JSON arguments object for this call
    pub fn arguments(&self, account_id: &str) -> Result<Value> {
        let mut args = Map::new();
        args.insert("accountId".to_string(), json!(account_id));

        match self {
            Self::MailboxQuery { name } => {
                args.insert("filter".to_string(), json!({ "name": name }));
            }
            Self::MailboxGet { ids } | Self::ThreadGet { ids } => ids.insert_into(&mut args),
            Self::EmailQuery(query) => {
                let mut filter = Map::new();
                if let Some(mailbox) = &query.in_mailbox {
                    filter.insert("inMailbox".to_string(), json!(mailbox));
                }
                if let Some(after) = query.after {
                    filter.insert(
                        "after".to_string(),
                        json!(after.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    );
                }
                args.insert("filter".to_string(), Value::Object(filter));
                if query.newest_first {
                    args.insert(
                        "sort".to_string(),
                        json!([{ "property": "receivedAt", "isAscending": false }]),
                    );
                }
                args.insert("collapseThreads".to_string(), json!(query.collapse_threads));
                if let Some(limit) = query.limit {
                    args.insert("limit".to_string(), json!(limit));
                }
            }
            Self::EmailGet(get) => {
                get.ids.insert_into(&mut args);
                if let Some(properties) = &get.properties {
                    args.insert("properties".to_string(), json!(properties));
                }
                if get.fetch_all_body_values {
                    args.insert("fetchAllBodyValues".to_string(), json!(true));
                }
                if let Some(max) = get.max_body_value_bytes {
                    args.insert("maxBodyValueBytes".to_string(), json!(max));
                }
            }
            Self::EmailChanges {
                since_state,
                max_changes,
            } => {
                args.insert("sinceState".to_string(), json!(since_state));
                if let Some(max) = max_changes {
                    args.insert("maxChanges".to_string(), json!(max));
                }
            }
            Self::EmailSet(set) => {
                if !set.create.is_empty() {
                    args.insert("create".to_string(), serde_json::to_value(&set.create)?);
                }
                if !set.update.is_empty() {
                    args.insert("update".to_string(), serde_json::to_value(&set.update)?);
                }
                if !set.destroy.is_empty() {
                    args.insert("destroy".to_string(), json!(set.destroy));
                }
            }
            Self::IdentityGet => {
                args.insert("ids".to_string(), Value::Null);
            }
            Self::EmailSubmissionSet(set) => {
                args.insert("create".to_string(), serde_json::to_value(&set.create)?);
                match &set.on_success {
                    OnSuccess::Nothing => {}
                    OnSuccess::UpdateEmail(patches) => {
                        args.insert(
                            "onSuccessUpdateEmail".to_string(),
                            serde_json::to_value(patches)?,
                        );
                    }
                    OnSuccess::DestroyEmail(ids) => {
                        args.insert("onSuccessDestroyEmail".to_string(), json!(ids));
                    }
                }
            }
        }

        Ok(Value::Object(args))
    }
}

/// An ordered, reference-chained list of method calls
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    steps: Vec<Method>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and return a handle for referencing its result
    pub fn push(&mut self, method: Method) -> StepRef {
        let step = StepRef {
            index: self.steps.len(),
            name: method.name(),
        };
        self.steps.push(method);
        step
    }

    pub fn steps(&self) -> &[Method] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(Method::name).collect()
    }

    pub fn is_mutating(&self) -> bool {
        self.steps.iter().any(Method::is_mutating)
    }

    /// Check that every result reference points at an earlier step of the
    /// expected method.
    pub fn validate(&self) -> Result<()> {
        for (index, method) in self.steps.iter().enumerate() {
            let Some(reference) = method.reference() else {
                continue;
            };
            if reference.result_of >= index {
                return Err(Error::protocol(format!(
                    "Step {} ({}) references step {} which does not precede it",
                    index,
                    method.name(),
                    reference.result_of
                )));
            }
            let target = self.steps[reference.result_of].name();
            if target != reference.name {
                return Err(Error::protocol(format!(
                    "Step {} references {} but step {} is {}",
                    index, reference.name, reference.result_of, target
                )));
            }
        }
        Ok(())
    }

    /// Encode the `methodCalls` array
    pub fn method_calls(&self, account_id: &str) -> Result<Vec<Value>> {
        self.validate()?;
        self.steps
            .iter()
            .enumerate()
            .map(|(index, method)| {
                Ok(json!([method.name(), method.arguments(account_id)?, index.to_string()]))
            })
            .collect()
    }

    /// Encode the full request body
    pub fn to_request(&self, account_id: &str) -> Result<Value> {
        Ok(json!({
            "using": [capabilities::CORE, capabilities::MAIL, capabilities::SUBMISSION],
            "methodCalls": self.method_calls(account_id)?,
        }))
    }

    /// Human-readable rendering used by dry runs
    pub fn render(&self, account_id: &str) -> Result<String> {
        let mut out = String::from("<<<<<<<<<<\n");
        for call in self.method_calls(account_id)? {
            out.push_str(&serde_json::to_string_pretty(&call)?);
            out.push('\n');
        }
        out.push_str(">>>>>>>>>>");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox_lookup(name: &str) -> Batch {
        let mut batch = Batch::new();
        let query = batch.push(Method::MailboxQuery {
            name: name.to_string(),
        });
        batch.push(Method::MailboxGet {
            ids: query.path("/ids"),
        });
        batch
    }

    #[test]
    fn test_result_reference_encoding() {
        let calls = mailbox_lookup("Drafts").method_calls("u1138").unwrap();

        assert_eq!(
            calls[0],
            json!(["Mailbox/query", { "accountId": "u1138", "filter": { "name": "Drafts" } }, "0"])
        );
        assert_eq!(
            calls[1],
            json!(["Mailbox/get", {
                "accountId": "u1138",
                "#ids": { "resultOf": "0", "name": "Mailbox/query", "path": "/ids" }
            }, "1"])
        );
    }

    #[test]
    fn test_request_envelope() {
        let request = mailbox_lookup("Inbox").to_request("u1").unwrap();
        assert_eq!(request["using"][1], "urn:ietf:params:jmap:mail");
        assert_eq!(request["methodCalls"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut batch = Batch::new();
        batch.push(Method::ThreadGet {
            ids: Ids::Ref(ResultRef {
                result_of: 0,
                name: "Thread/get",
                path: "/list/*/threadId".to_string(),
            }),
        });
        assert!(batch.validate().is_err());
        assert!(batch.to_request("u1").is_err());
    }

    #[test]
    fn test_mismatched_reference_rejected() {
        let mut batch = Batch::new();
        let query = batch.push(Method::MailboxQuery {
            name: "Inbox".to_string(),
        });
        batch.push(Method::IdentityGet);
        batch.push(Method::ThreadGet {
            ids: Ids::Ref(ResultRef {
                result_of: 1,
                name: query.name(),
                path: "/ids".to_string(),
            }),
        });
        let err = batch.validate().unwrap_err();
        assert!(err.to_string().contains("step 1 is Identity/get"));
    }

    #[test]
    fn test_email_query_arguments() {
        let after = DateTime::parse_from_rfc3339("1994-08-23T12:01:02Z")
            .unwrap()
            .with_timezone(&Utc);
        let method = Method::EmailQuery(EmailQuery {
            in_mailbox: Some(MailboxId::new("MBX50")),
            after: Some(after),
            collapse_threads: true,
            newest_first: true,
            limit: Some(10),
        });

        let args = method.arguments("u1138").unwrap();
        assert_eq!(args["filter"]["inMailbox"], "MBX50");
        assert_eq!(args["filter"]["after"], "1994-08-23T12:01:02Z");
        assert_eq!(args["sort"][0]["isAscending"], false);
        assert_eq!(args["collapseThreads"], true);
        assert_eq!(args["limit"], 10);
    }

    #[test]
    fn test_email_get_with_bodies() {
        let method = Method::EmailGet(
            EmailGet::new(Ids::list(["Mdeadbeef"])).with_bodies(1024 * 1024),
        );
        let args = method.arguments("u1").unwrap();
        assert_eq!(args["ids"], json!(["Mdeadbeef"]));
        assert_eq!(args["fetchAllBodyValues"], true);
        assert_eq!(args["maxBodyValueBytes"], 1048576);
        assert!(args.get("properties").is_none());
    }

    #[test]
    fn test_patch_paths() {
        let mut patch = Patch::new();
        patch
            .set_keyword(keywords::SEEN)
            .remove_mailbox(&MailboxId::new("MBX1"));

        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({ "keywords/$seen": true, "mailboxIds/MBX1": null }));
        assert_eq!(patch.len(), 2);
    }

    #[test]
    fn test_submission_on_success_destroy() {
        let mut set = SubmissionSet::default();
        set.create.insert(
            "emailToSend".to_string(),
            SubmissionCreate {
                email_id: "#draft".to_string(),
                identity_id: IdentityId::new("ID1"),
                envelope: Envelope::new("ness@onett.example.com", &["paula@twoson.example.com"]),
            },
        );
        set.on_success = OnSuccess::DestroyEmail(vec!["#emailToSend".to_string()]);

        let args = Method::EmailSubmissionSet(set).arguments("u1").unwrap();
        assert_eq!(args["create"]["emailToSend"]["emailId"], "#draft");
        assert_eq!(
            args["create"]["emailToSend"]["envelope"]["rcptTo"][0]["email"],
            "paula@twoson.example.com"
        );
        assert_eq!(args["onSuccessDestroyEmail"], json!(["#emailToSend"]));
        assert!(args.get("onSuccessUpdateEmail").is_none());
    }

    #[test]
    fn test_draft_without_html() {
        let draft = DraftEmail::new(&MailboxId::new("MBX3"), "hello", None);
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["keywords"], json!({ "$draft": true }));
        assert_eq!(value["mailboxIds"], json!({ "MBX3": true }));
        assert_eq!(value["bodyValues"]["text"]["value"], "hello");
        assert!(value.get("htmlBody").is_none());
    }

    #[test]
    fn test_render_and_mutation_flags() {
        let batch = mailbox_lookup("Inbox");
        assert!(!batch.is_mutating());
        let rendered = batch.render("u1").unwrap();
        assert!(rendered.starts_with("<<<<<<<<<<"));
        assert!(rendered.ends_with(">>>>>>>>>>"));
        assert!(rendered.contains("Mailbox/query"));

        let mut batch = Batch::new();
        batch.push(Method::EmailSet(EmailSet::update(MessageId::new("M1"), Patch::new())));
        assert!(batch.is_mutating());
        assert_eq!(batch.method_names(), vec!["Email/set"]);
    }
}
