//! JMAP protocol integration
//!
//! This module provides:
//! - Typed, reference-chained method batches (`Batch`)
//! - The `JmapApi` trait the reply engine talks to
//! - An HTTP client with session discovery and an event source stream
//! - A scripted in-memory client for tests and offline runs

mod client;
mod events;
mod request;
mod scripted;

pub use client::{JmapClient, Session};
pub use events::EventStream;
pub use request::{
    Batch, DraftEmail, EmailGet, EmailQuery, EmailSet, Envelope, EnvelopeAddress, Ids, Method,
    OnSuccess, Patch, ResultRef, StepRef, SubmissionCreate, SubmissionSet,
};
pub use scripted::ScriptedClient;

use crate::error::Result;

/// Capability URNs sent in every request
pub mod capabilities {
    pub const CORE: &str = "urn:ietf:params:jmap:core";
    pub const MAIL: &str = "urn:ietf:params:jmap:mail";
    pub const SUBMISSION: &str = "urn:ietf:params:jmap:submission";
}

/// The batched-call primitive the engine is built on
///
/// Implementations submit every step of a batch in a single request and
/// return the method responses in order. Result references between steps
/// are resolved by the server.
pub trait JmapApi: Send + Sync {
    /// The account all method calls operate on
    fn account_id(&self) -> &str;

    /// Submit a batch and return its method responses
    fn call(&self, batch: &Batch) -> Result<Vec<api::MethodResponse>>;
}

/// JMAP response types
pub mod api {
    use chrono::{DateTime, Utc};
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::collections::HashMap;

    use super::StepRef;
    use crate::error::{Error, Result};
    use crate::models::{MessageId, StateToken};

    /// One `[name, arguments, callId]` entry of `methodResponses`
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(from = "(String, Value, String)", into = "(String, Value, String)")]
    pub struct MethodResponse {
        pub name: String,
        pub arguments: Value,
        pub call_id: String,
    }

    impl From<(String, Value, String)> for MethodResponse {
        fn from((name, arguments, call_id): (String, Value, String)) -> Self {
            Self {
                name,
                arguments,
                call_id,
            }
        }
    }

    impl From<MethodResponse> for (String, Value, String) {
        fn from(r: MethodResponse) -> Self {
            (r.name, r.arguments, r.call_id)
        }
    }

    /// Arguments of an `error` method response
    #[derive(Debug, Deserialize)]
    struct MethodError {
        #[serde(rename = "type")]
        kind: String,
        description: Option<String>,
    }

    impl MethodResponse {
        pub fn new(name: impl Into<String>, arguments: Value, call_id: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                arguments,
                call_id: call_id.into(),
            }
        }

        /// Deserialize the arguments, checking the response name first.
        ///
        /// An `error` response is converted into `Error::Method`.
        pub fn parse<T: DeserializeOwned>(&self, expected: &str) -> Result<T> {
            if self.name == "error" {
                let err: MethodError = serde_json::from_value(self.arguments.clone())?;
                return Err(Error::Method {
                    method: expected.to_string(),
                    kind: err.kind,
                    description: err.description,
                });
            }
            if self.name != expected {
                return Err(Error::protocol(format!(
                    "Expected {} response for call {}, got {}",
                    expected, self.call_id, self.name
                )));
            }
            Ok(serde_json::from_value(self.arguments.clone())?)
        }
    }

    /// Find the response for a batch step and parse it
    pub fn response_for<T: DeserializeOwned>(
        responses: &[MethodResponse],
        step: &StepRef,
    ) -> Result<T> {
        let call_id = step.call_id();
        let response = responses
            .iter()
            .find(|r| r.call_id == call_id)
            .ok_or_else(|| {
                Error::protocol(format!("Missing {} response for call {}", step.name(), call_id))
            })?;
        response.parse(step.name())
    }

    /// Top-level API response body
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Response {
        pub method_responses: Vec<MethodResponse>,
        #[serde(default)]
        pub session_state: Option<String>,
    }

    /// Response to any `Foo/get`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GetResponse<T> {
        #[serde(default)]
        pub account_id: String,
        #[serde(default)]
        pub state: Option<StateToken>,
        pub list: Vec<T>,
        #[serde(default)]
        pub not_found: Option<Vec<String>>,
    }

    /// Response to any `Foo/query`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct QueryResponse {
        pub ids: Vec<String>,
        #[serde(default)]
        pub query_state: Option<String>,
        #[serde(default)]
        pub total: Option<u64>,
    }

    /// Response to `Email/changes`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ChangesResponse {
        pub old_state: StateToken,
        pub new_state: StateToken,
        #[serde(default)]
        pub has_more_changes: bool,
        #[serde(default)]
        pub created: Vec<MessageId>,
        #[serde(default)]
        pub updated: Vec<MessageId>,
        #[serde(default)]
        pub destroyed: Vec<MessageId>,
    }

    /// A `SetError` from `notCreated` / `notUpdated` / `notDestroyed`
    #[derive(Debug, Clone, Deserialize)]
    pub struct SetError {
        #[serde(rename = "type")]
        pub kind: String,
        #[serde(default)]
        pub description: Option<String>,
    }

    impl std::fmt::Display for SetError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match &self.description {
                Some(d) => write!(f, "{} ({})", self.kind, d),
                None => f.write_str(&self.kind),
            }
        }
    }

    /// Response to any `Foo/set`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SetResponse<T = Value> {
        #[serde(default)]
        pub new_state: Option<StateToken>,
        #[serde(default = "none")]
        pub created: Option<HashMap<String, T>>,
        #[serde(default)]
        pub updated: Option<HashMap<String, Option<Value>>>,
        #[serde(default)]
        pub destroyed: Option<Vec<String>>,
        #[serde(default)]
        pub not_created: Option<HashMap<String, SetError>>,
        #[serde(default)]
        pub not_updated: Option<HashMap<String, SetError>>,
        #[serde(default)]
        pub not_destroyed: Option<HashMap<String, SetError>>,
    }

    fn none<T>() -> Option<T> {
        None
    }

    /// A created `EmailSubmission` as reported by `EmailSubmission/set`
    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Submission {
        pub id: String,
        #[serde(default)]
        pub send_at: Option<DateTime<Utc>>,
        #[serde(default)]
        pub undo_status: Option<String>,
    }
}
