//! In-memory JMAP client that replays canned responses
//!
//! Each call to `call` pops the next queued reply and records the submitted
//! batch, so tests can drive the engine without a server and then inspect
//! exactly which method calls were made.

use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::api::MethodResponse;
use super::{Batch, JmapApi};
use crate::error::{Error, Result};

pub struct ScriptedClient {
    account_id: String,
    replies: Mutex<VecDeque<Result<Vec<MethodResponse>>>>,
    batches: Mutex<Vec<Batch>>,
}

impl ScriptedClient {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            replies: Mutex::new(VecDeque::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Queue a full reply
    pub fn push_reply(&self, responses: Vec<MethodResponse>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Ok(responses));
    }

    /// Queue a reply whose call IDs are the step indices `0..n`
    pub fn push_responses<I, S>(&self, responses: I)
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let responses = responses
            .into_iter()
            .enumerate()
            .map(|(index, (name, arguments))| {
                MethodResponse::new(name, arguments, index.to_string())
            })
            .collect();
        self.push_reply(responses);
    }

    /// Queue a transport-level failure
    pub fn push_error(&self, error: Error) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
    }

    /// Every batch submitted so far, in order
    pub fn batches(&self) -> Vec<Batch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of queued replies not yet consumed
    pub fn pending(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl JmapApi for ScriptedClient {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    fn call(&self, batch: &Batch) -> Result<Vec<MethodResponse>> {
        batch.validate()?;
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch.clone());

        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::protocol(format!(
                    "No scripted reply for {:?}",
                    batch.method_names()
                )))
            })
    }
}
