//! Send a reply as one draft-create + submit request
//!
//! The draft is created in the drafts mailbox and submitted in the same
//! request. On success the server either moves the draft to the sent
//! mailbox or destroys it, so a reply never lingers as a draft.

use chrono::{DateTime, Utc};
use log::info;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DispatchMode, MailboxNames, print_dry_run};
use crate::error::{Error, Result};
use crate::jmap::api::{MethodResponse, SetResponse, Submission, response_for};
use crate::jmap::{
    Batch, DraftEmail, EmailSet, Envelope, JmapApi, Method, OnSuccess, Patch, StepRef,
    SubmissionCreate, SubmissionSet,
};
use crate::lookup::{IdentityMatcher, MailboxResolver};
use crate::models::{EmailAddress, Header, Identity, Mailbox, Message, keywords};

/// Creation ID of the draft within the send request
const DRAFT_CREATION_ID: &str = "draft";
/// Creation ID of the submission within the send request
const SUBMISSION_CREATION_ID: &str = "emailToSend";

/// Fresh Message-ID for a reply sent from `address` at `now`
///
/// Unique only as far as two replies from one address are never sent in the
/// same microsecond.
pub fn make_message_id(now: DateTime<Utc>, address: &str) -> String {
    let timestamp = now
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
        .replace([':', '-'], ".");
    let dotted: String = address
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '.' })
        .collect();
    format!("{timestamp}@responder.{dotted}")
}

pub struct ReplyDispatcher {
    api: Arc<dyn JmapApi>,
    mailboxes: Arc<MailboxResolver>,
    identities: Arc<IdentityMatcher>,
    drafts_name: String,
    sent_name: String,
    mode: DispatchMode,
}

/// Where the draft and the sent copy live
struct Placement {
    drafts: Mailbox,
    sent: Option<Mailbox>,
}

impl ReplyDispatcher {
    pub fn new(
        api: Arc<dyn JmapApi>,
        mailboxes: Arc<MailboxResolver>,
        identities: Arc<IdentityMatcher>,
        names: &MailboxNames,
        mode: DispatchMode,
    ) -> Self {
        Self {
            api,
            mailboxes,
            identities,
            drafts_name: names.drafts.clone(),
            sent_name: names.sent.clone(),
            mode,
        }
    }

    /// Reply to `original` from the identity it was addressed to
    ///
    /// Returns the created submission, or `None` in dry-run mode.
    pub fn send_reply(
        &self,
        original: &Message,
        text_body: &str,
        html_body: Option<&str>,
        user_agent: Option<&str>,
        keep_sent_copy: bool,
    ) -> Result<Option<Submission>> {
        let identity = self
            .identities
            .match_recipients(original)?
            .ok_or_else(|| Error::NoMatchingIdentity {
                message_id: original.id.to_string(),
            })?;
        let placement = Placement {
            drafts: self.mailboxes.require(&self.drafts_name)?,
            sent: if keep_sent_copy {
                Some(self.mailboxes.require(&self.sent_name)?)
            } else {
                None
            },
        };
        let reply_to = original.reply_address().ok_or_else(|| {
            Error::protocol(format!("Message {} has no reply address", original.id))
        })?;

        let mut draft = DraftEmail::new(&placement.drafts.id, text_body, html_body);
        draft.from = vec![EmailAddress::new(&identity.email)];
        draft.to = vec![EmailAddress::new(reply_to)];
        draft.subject = format!("Re: {}", original.subject.as_deref().unwrap_or_default());
        let original_ids = original.message_id.clone().unwrap_or_default();
        draft.references = original
            .references
            .iter()
            .flatten()
            .chain(&original_ids)
            .cloned()
            .collect();
        draft.in_reply_to = original_ids;
        draft.message_id = vec![make_message_id(Utc::now(), &identity.email)];
        if let Some(agent) = user_agent {
            draft.headers.push(Header {
                name: "User-Agent".to_string(),
                value: agent.to_string(),
            });
        }

        let (batch, create, submit) = build_transaction(draft, &identity, &placement);

        if !self.mode.is_live() {
            print_dry_run(&batch.render(self.api.account_id())?);
            return Ok(None);
        }

        let responses = self.api.call(&batch)?;
        let submission = Self::submission_from(&responses, &create, &submit)?;

        info!(
            "Reply for \"{}\" sent to {}",
            original.subject.as_deref().unwrap_or_default(),
            reply_to
        );
        Ok(Some(submission))
    }

    fn submission_from(
        responses: &[MethodResponse],
        create: &StepRef,
        submit: &StepRef,
    ) -> Result<Submission> {
        let created: SetResponse<Value> = send_step(responses, create)?;
        if let Some(err) = created
            .not_created
            .as_ref()
            .and_then(|failed| failed.get(DRAFT_CREATION_ID))
        {
            return Err(Error::submission(format!("Draft was not created: {err}")));
        }

        let submitted: SetResponse<Submission> = send_step(responses, submit)?;
        if let Some(err) = submitted
            .not_created
            .as_ref()
            .and_then(|failed| failed.get(SUBMISSION_CREATION_ID))
        {
            return Err(Error::submission(format!("Reply was not submitted: {err}")));
        }

        submitted
            .created
            .and_then(|mut created| created.remove(SUBMISSION_CREATION_ID))
            .ok_or_else(|| Error::submission("Submission missing from EmailSubmission/set response"))
    }
}

/// Parse one step of the send request
///
/// A method-level `error` or a missing response means no submission was
/// created, so both become `Error::Submission`.
fn send_step<T: DeserializeOwned>(responses: &[MethodResponse], step: &StepRef) -> Result<T> {
    if !responses.iter().any(|r| r.call_id == step.call_id()) {
        return Err(Error::submission(format!("No {} response", step.name())));
    }
    response_for(responses, step).map_err(|e| match e {
        Error::Method { .. } | Error::Protocol(_) => Error::submission(e.to_string()),
        other => other,
    })
}

/// Draft creation followed by its submission, with the on-success move to
/// the sent mailbox (or destruction of the draft)
fn build_transaction(
    draft: DraftEmail,
    identity: &Identity,
    placement: &Placement,
) -> (Batch, StepRef, StepRef) {
    let rcpt_to: Vec<&str> = draft.to.iter().map(|a| a.email.as_str()).collect();
    let envelope = Envelope::new(&identity.email, &rcpt_to);

    let mut submissions = SubmissionSet::default();
    submissions.create.insert(
        SUBMISSION_CREATION_ID.to_string(),
        SubmissionCreate {
            email_id: format!("#{DRAFT_CREATION_ID}"),
            identity_id: identity.id.clone(),
            envelope,
        },
    );
    let reference = format!("#{SUBMISSION_CREATION_ID}");
    submissions.on_success = match &placement.sent {
        Some(sent) => {
            let mut patch = Patch::new();
            patch
                .clear_keyword(keywords::DRAFT)
                .set_keyword(keywords::SEEN)
                .remove_mailbox(&placement.drafts.id)
                .add_mailbox(&sent.id);
            OnSuccess::UpdateEmail(BTreeMap::from([(reference, patch)]))
        }
        None => OnSuccess::DestroyEmail(vec![reference]),
    };

    let mut batch = Batch::new();
    let create = batch.push(Method::EmailSet(EmailSet::create(DRAFT_CREATION_ID, draft)));
    let submit = batch.push(Method::EmailSubmissionSet(submissions));
    (batch, create, submit)
}
