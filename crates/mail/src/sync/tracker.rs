//! Per-account state tracking for push notifications

use log::debug;
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::jmap::api::{ChangesResponse, response_for};
use crate::jmap::{Batch, JmapApi, Method};
use crate::models::{EMAIL_TYPE, MessageId, StateToken, TypeState};

/// Where an account is in handling a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Diffing,
    FetchingChanges,
    FilteringThreads,
    FetchingMessages,
    Dispatching,
}

/// How an account's Email state moved with a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// No Email state reported, or the same token as before
    Unchanged,
    /// First Email token seen for the account; nothing to diff against
    Baseline,
    Changed { since: StateToken, to: StateToken },
}

/// Last known type states for every account seen on the push channel
#[derive(Debug, Default)]
pub struct ChangeTracker {
    states: HashMap<String, TypeState>,
    phases: HashMap<String, Phase>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the reported type states for an account and classify the
    /// Email transition.
    ///
    /// Types missing from the report keep their previous token.
    pub fn observe(&mut self, account_id: &str, reported: &TypeState) -> Transition {
        let recorded = self.states.entry(account_id.to_string()).or_default();
        let previous = recorded.get(EMAIL_TYPE).cloned();
        recorded.extend(reported.iter().map(|(k, v)| (k.clone(), v.clone())));

        match (previous, reported.get(EMAIL_TYPE)) {
            (_, None) => Transition::Unchanged,
            (None, Some(_)) => Transition::Baseline,
            (Some(since), Some(to)) if since == *to => Transition::Unchanged,
            (Some(since), Some(to)) => Transition::Changed {
                since,
                to: to.clone(),
            },
        }
    }

    pub fn email_state(&self, account_id: &str) -> Option<&StateToken> {
        self.states.get(account_id)?.get(EMAIL_TYPE)
    }

    pub fn state(&self, account_id: &str) -> Option<&TypeState> {
        self.states.get(account_id)
    }

    pub fn phase(&self, account_id: &str) -> Phase {
        self.phases.get(account_id).copied().unwrap_or_default()
    }

    pub fn set_phase(&mut self, account_id: &str, phase: Phase) {
        debug!("Account {} -> {:?}", account_id, phase);
        self.phases.insert(account_id.to_string(), phase);
    }
}

/// Messages created or updated since a state
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub ids: Vec<MessageId>,
    pub new_state: StateToken,
}

/// Collect Email changes since `since`, following `hasMoreChanges`
///
/// Created and updated IDs are merged without duplicates; destroyed
/// messages are ignored.
pub fn collect_changes(api: &dyn JmapApi, since: &StateToken) -> Result<ChangeSet> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut state = since.clone();

    loop {
        let mut batch = Batch::new();
        let step = batch.push(Method::EmailChanges {
            since_state: state.clone(),
            max_changes: None,
        });
        let responses = api.call(&batch)?;
        let changes: ChangesResponse = response_for(&responses, &step)?;

        for id in changes.created.into_iter().chain(changes.updated) {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        if !changes.has_more_changes {
            debug!("{} changed messages since state {}", ids.len(), since);
            return Ok(ChangeSet {
                ids,
                new_state: changes.new_state,
            });
        }
        if changes.new_state == state {
            return Err(Error::protocol(format!(
                "Email/changes reported more changes without advancing past state {state}"
            )));
        }
        state = changes.new_state;
    }
}
