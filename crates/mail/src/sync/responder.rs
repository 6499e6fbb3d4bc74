//! Reply orchestration
//!
//! Drives the per-message pipeline (match identity, compose, send, archive)
//! over messages found either by polling a mailbox once or by following
//! push notifications. A failure on one message is recorded in the run
//! report and never stops its siblings.

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

use super::tracker::{ChangeTracker, Phase, Transition, collect_changes};
use crate::actions::{Archiver, DispatchMode, MailboxNames, ReplyDispatcher};
use crate::compose::{QuotingComposer, ReplyComposer, attribution_line, user_agent};
use crate::error::Result;
use crate::jmap::JmapApi;
use crate::jmap::api::Submission;
use crate::lookup::{IdentityMatcher, MailboxResolver};
use crate::models::{Mailbox, Message, MessageId, StateChange, StateToken};
use crate::query::{
    THREAD_BATCH_SIZE, eligible_from_change_set, fetch_messages, find_unanswered_in_mailbox,
};

/// What a run does and how far it goes
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Mailbox whose unanswered messages get a reply
    pub mailbox_name: String,
    /// HTML reply template
    pub reply_content: String,
    /// Only poll messages received this many days ago or newer (0 = no floor)
    pub newer_than_days: u32,
    /// Stop polling after this many replies (0 = no limit)
    pub max_replies: usize,
    pub mode: DispatchMode,
    pub keep_sent_copy: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mailbox_name: "Inbox".to_string(),
            reply_content: String::new(),
            newer_than_days: 1,
            max_replies: 0,
            mode: DispatchMode::DryRun,
            keep_sent_copy: true,
        }
    }
}

/// Oldest receive time a one-shot poll looks at
///
/// `None` when `days` is 0, or when the floor would fall outside the
/// representable date range.
pub fn received_after(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    if days == 0 {
        return None;
    }
    let floor = TimeDelta::try_days(i64::from(days)).and_then(|d| now.checked_sub_signed(d));
    if floor.is_none() {
        warn!("{} days reaches past the earliest date, not filtering by date", days);
    }
    floor
}

/// Result of the pipeline for one message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// A reply was sent (or printed, in dry-run mode, with no submission)
    Replied {
        submission: Option<Submission>,
        archived: bool,
    },
    /// No sending identity matches the message's recipients
    Skipped,
}

/// Per-message results of a run
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<(MessageId, Result<MessageOutcome>)>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn replied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Ok(MessageOutcome::Replied { .. })))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, Ok(MessageOutcome::Skipped)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_err()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn outcome(&self, id: &MessageId) -> Option<&Result<MessageOutcome>> {
        self.outcomes
            .iter()
            .find(|(message_id, _)| message_id == id)
            .map(|(_, outcome)| outcome)
    }

    pub fn merge(&mut self, other: RunReport) {
        self.outcomes.extend(other.outcomes);
        self.duration_ms += other.duration_ms;
    }
}

/// Replies to unanswered messages in one mailbox of one account
pub struct Responder {
    api: Arc<dyn JmapApi>,
    mailboxes: Arc<MailboxResolver>,
    identities: Arc<IdentityMatcher>,
    dispatcher: ReplyDispatcher,
    archiver: Archiver,
    composer: Box<dyn ReplyComposer>,
    tracker: ChangeTracker,
    names: MailboxNames,
    options: RunOptions,
}

impl Responder {
    pub fn new(api: Arc<dyn JmapApi>, names: MailboxNames, options: RunOptions) -> Self {
        let mailboxes = Arc::new(MailboxResolver::new(api.clone()));
        let identities = Arc::new(IdentityMatcher::new(api.clone()));
        let dispatcher = ReplyDispatcher::new(
            api.clone(),
            mailboxes.clone(),
            identities.clone(),
            &names,
            options.mode,
        );
        let archiver = Archiver::new(api.clone(), mailboxes.clone(), &names.inbox, options.mode);

        Self {
            api,
            mailboxes,
            identities,
            dispatcher,
            archiver,
            composer: Box::new(QuotingComposer),
            tracker: ChangeTracker::new(),
            names,
            options,
        }
    }

    pub fn with_composer(mut self, composer: Box<dyn ReplyComposer>) -> Self {
        self.composer = composer;
        self
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn mailboxes(&self) -> &MailboxResolver {
        &self.mailboxes
    }

    /// Poll the mailbox once and reply to what needs a reply
    pub fn run_once(&mut self) -> Result<RunReport> {
        let start = Instant::now();
        let target = self.prepare()?;

        let since = received_after(Utc::now(), self.options.newer_than_days);
        let messages =
            find_unanswered_in_mailbox(self.api.as_ref(), &target.id, since, THREAD_BATCH_SIZE)?;
        info!(
            "Found {} unanswered messages in \"{}\"",
            messages.len(),
            target.name
        );

        let mut report = self.process_messages(&messages, self.options.max_replies);
        report.duration_ms = start.elapsed().as_millis() as u64;
        Ok(report)
    }

    /// Resolve every mailbox a run touches in one request and return the
    /// target mailbox
    fn prepare(&self) -> Result<Mailbox> {
        let mut names = vec![
            self.options.mailbox_name.as_str(),
            self.names.inbox.as_str(),
            self.names.drafts.as_str(),
        ];
        if self.options.keep_sent_copy {
            names.push(self.names.sent.as_str());
        }
        self.mailboxes.preload(&names)?;
        self.mailboxes.require(&self.options.mailbox_name)
    }

    /// Follow push notifications until the stream ends
    ///
    /// The mailboxes are resolved before the first notification is read.
    /// A failure while handling one notification is logged and the loop
    /// continues; a failure reading the stream ends the run.
    pub fn process_events<I>(&mut self, events: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = Result<StateChange>>,
    {
        let target = self.prepare()?;
        info!("Listening for events on \"{}\"", target.name);
        let mut report = RunReport::default();
        for event in events {
            let change = event?;
            debug!("Received event {:?}", change);
            match self.handle_state_change(&change) {
                Ok(handled) => report.merge(handled),
                Err(e) => warn!("Error handling state change: {}", e),
            }
        }
        info!("Event stream closed");
        Ok(report)
    }

    /// Handle one push notification
    pub fn handle_state_change(&mut self, change: &StateChange) -> Result<RunReport> {
        let own_account = self.api.account_id().to_string();
        let mut report = RunReport::default();

        for (account_id, types) in &change.changed {
            let transition = self.tracker.observe(account_id, types);
            if *account_id != own_account {
                debug!("Ignoring state change for account {}", account_id);
                continue;
            }
            match transition {
                Transition::Unchanged => debug!("Email state unchanged"),
                Transition::Baseline => debug!("Recorded baseline Email state"),
                Transition::Changed { since, to } => {
                    debug!("Email state {} -> {}", since, to);
                    let started = Instant::now();
                    let result = self.handle_email_change(&own_account, &since);
                    self.tracker.set_phase(&own_account, Phase::Idle);
                    let mut handled = result?;
                    handled.duration_ms = started.elapsed().as_millis() as u64;
                    report.merge(handled);
                }
            }
        }

        Ok(report)
    }

    fn handle_email_change(&mut self, account_id: &str, since: &StateToken) -> Result<RunReport> {
        self.tracker.set_phase(account_id, Phase::Diffing);
        let target = self.mailboxes.require(&self.options.mailbox_name)?;

        self.tracker.set_phase(account_id, Phase::FetchingChanges);
        let changes = collect_changes(self.api.as_ref(), since)?;

        self.tracker.set_phase(account_id, Phase::FilteringThreads);
        let eligible = eligible_from_change_set(self.api.as_ref(), &changes.ids, &target.id)?;

        self.tracker.set_phase(account_id, Phase::FetchingMessages);
        let messages = fetch_messages(self.api.as_ref(), eligible)?;

        self.tracker.set_phase(account_id, Phase::Dispatching);
        Ok(self.process_messages(&messages, 0))
    }

    /// Run the pipeline over each message in order, recording one result
    /// per message
    ///
    /// With a non-zero `limit`, stops once that many replies went out.
    pub fn process_messages(&self, messages: &[Message], limit: usize) -> RunReport {
        let mut report = RunReport::default();
        for message in messages {
            if limit > 0 && report.replied() >= limit {
                info!("Reached the limit of {} replies", limit);
                break;
            }
            let outcome = self.handle_message(message);
            if let Err(e) = &outcome {
                error!("Error handling message {}: {}", message.id, e);
            }
            report.outcomes.push((message.id.clone(), outcome));
        }
        report
    }

    fn handle_message(&self, message: &Message) -> Result<MessageOutcome> {
        info!(
            "[{}] from {}: {}",
            message
                .received_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            message.sender().map(|a| a.display()).unwrap_or_default(),
            message.subject.as_deref().unwrap_or_default()
        );

        if self.identities.match_recipients(message)?.is_none() {
            info!("No identity matches the recipients of {}, skipping", message.id);
            return Ok(MessageOutcome::Skipped);
        }

        let reply = self.composer.compose(
            &self.options.reply_content,
            message.text_content(),
            message.html_content(),
            attribution_line(message).as_deref(),
        )?;
        let submission = self.dispatcher.send_reply(
            message,
            &reply.text_body,
            reply.html_body.as_deref(),
            Some(user_agent().as_str()),
            self.options.keep_sent_copy,
        )?;
        let archived = self.archiver.archive(message)?;

        Ok(MessageOutcome::Replied {
            submission,
            archived,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_report_counts() {
        let mut report = RunReport::default();
        report.outcomes.push((
            MessageId::new("M1"),
            Ok(MessageOutcome::Replied {
                submission: None,
                archived: true,
            }),
        ));
        report
            .outcomes
            .push((MessageId::new("M2"), Ok(MessageOutcome::Skipped)));

        let mut other = RunReport::default();
        other
            .outcomes
            .push((MessageId::new("M3"), Err(Error::submission("rejected"))));
        other.duration_ms = 5;
        report.merge(other);

        assert_eq!(report.replied(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.duration_ms, 5);
        assert!(report.outcome(&MessageId::new("M3")).unwrap().is_err());
        assert!(report.outcome(&MessageId::new("M4")).is_none());
    }

    #[test]
    fn test_received_after() {
        let now = Utc::now();
        assert_eq!(received_after(now, 0), None);
        assert_eq!(received_after(now, 7), Some(now - TimeDelta::days(7)));
        assert_eq!(received_after(now, 200_000_000), None);
        assert_eq!(received_after(now, u32::MAX), None);
    }

    #[test]
    fn test_default_options_are_safe() {
        let options = RunOptions::default();
        assert_eq!(options.mode, DispatchMode::DryRun);
        assert_eq!(options.max_replies, 0);
        assert_eq!(options.newer_than_days, 1);
    }
}
