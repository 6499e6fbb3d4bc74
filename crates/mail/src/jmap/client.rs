//! JMAP HTTP client
//!
//! Discovers the session resource, submits method batches to the API URL and
//! opens the push event source. Uses synchronous HTTP (ureq) so the engine
//! stays executor-agnostic.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufReader;
use url::Url;

use super::api::{MethodResponse, Response};
use super::events::EventStream;
use super::{Batch, JmapApi, capabilities};
use crate::config::JmapCredentials;
use crate::error::{Error, Result};

/// The JMAP session resource (`/.well-known/jmap`)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub api_url: String,
    #[serde(default)]
    pub event_source_url: Option<String>,
    #[serde(default)]
    pub primary_accounts: HashMap<String, String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub state: Option<String>,
}

impl Session {
    /// Primary account for the mail capability
    pub fn mail_account(&self) -> Result<&str> {
        self.primary_accounts
            .get(capabilities::MAIL)
            .map(String::as_str)
            .ok_or_else(|| Error::protocol("Session has no primary mail account"))
    }

    /// Expand the event source URL template for Email state pushes
    pub fn event_source(&self) -> Result<Url> {
        let template = self
            .event_source_url
            .as_deref()
            .ok_or_else(|| Error::protocol("Session has no event source URL"))?;
        let expanded = template
            .replace("{types}", "Email")
            .replace("{closeafter}", "no")
            .replace("{ping}", &JmapClient::PING_INTERVAL_SECS.to_string());
        Url::parse(&expanded)
            .map_err(|e| Error::protocol(format!("Invalid event source URL {expanded}: {e}")))
    }
}

/// Blocking JMAP client bound to one account
pub struct JmapClient {
    session: Session,
    account_id: String,
    api_url: Url,
    api_token: String,
}

impl JmapClient {
    /// Seconds between keep-alive pings requested from the event source
    pub const PING_INTERVAL_SECS: u32 = 60;

    /// Fetch the session resource and bind to the primary mail account
    pub fn connect(credentials: &JmapCredentials) -> Result<Self> {
        let session_url = Self::session_url(&credentials.host)?;
        log::debug!("Fetching JMAP session from {}", session_url);

        let mut response = ureq::get(session_url.as_str())
            .header("Authorization", &format!("Bearer {}", credentials.api_token))
            .call()?;
        let session: Session = response.body_mut().read_json()?;

        Self::with_session(session, credentials.api_token.clone())
    }

    /// Build a client from an already fetched session
    pub fn with_session(session: Session, api_token: String) -> Result<Self> {
        let account_id = session.mail_account()?.to_string();
        let api_url = Url::parse(&session.api_url)
            .map_err(|e| Error::protocol(format!("Invalid API URL {}: {}", session.api_url, e)))?;

        log::info!(
            "Connected to JMAP account {} as {}",
            account_id,
            session.username
        );

        Ok(Self {
            session,
            account_id,
            api_url,
            api_token,
        })
    }

    fn session_url(host: &str) -> Result<Url> {
        Url::parse(&format!("https://{host}/.well-known/jmap"))
            .map_err(|e| Error::configuration(format!("Invalid JMAP host {host}: {e}")))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Open the push channel for Email state changes
    ///
    /// The returned stream blocks until the next event arrives and ends when
    /// the server closes the connection.
    pub fn event_source(&self) -> Result<EventStream<BufReader<ureq::BodyReader<'static>>>> {
        let url = self.session.event_source()?;
        log::debug!("Opening event source {}", url);

        let response = ureq::get(url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_token))
            .header("Accept", "text/event-stream")
            .call()?;

        Ok(EventStream::new(BufReader::new(
            response.into_body().into_reader(),
        )))
    }
}

impl JmapApi for JmapClient {
    fn account_id(&self) -> &str {
        &self.account_id
    }

    fn call(&self, batch: &Batch) -> Result<Vec<MethodResponse>> {
        let request = batch.to_request(&self.account_id)?;
        log::debug!("Submitting {:?}", batch.method_names());

        let mut response = ureq::post(self.api_url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_token))
            .send_json(&request)?;
        let body: Response = response.body_mut().read_json()?;

        if body.method_responses.len() != batch.len() {
            log::warn!(
                "Expected {} method responses, got {}",
                batch.len(),
                body.method_responses.len()
            );
        }

        Ok(body.method_responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> Session {
        serde_json::from_value(json!({
            "apiUrl": "https://jmap.example.com/api/",
            "eventSourceUrl": "https://jmap.example.com/eventsource/?types={types}&closeafter={closeafter}&ping={ping}",
            "primaryAccounts": {
                "urn:ietf:params:jmap:core": "u1138",
                "urn:ietf:params:jmap:mail": "u1138"
            },
            "username": "ness@onett.example.com",
            "capabilities": {},
            "accounts": {}
        }))
        .unwrap()
    }

    #[test]
    fn test_session_mail_account() {
        assert_eq!(session().mail_account().unwrap(), "u1138");
    }

    #[test]
    fn test_session_without_mail_account() {
        let mut session = session();
        session.primary_accounts.clear();
        assert!(session.mail_account().unwrap_err().is_protocol());
    }

    #[test]
    fn test_event_source_expansion() {
        let url = session().event_source().unwrap();
        assert_eq!(
            url.as_str(),
            "https://jmap.example.com/eventsource/?types=Email&closeafter=no&ping=60"
        );
    }

    #[test]
    fn test_with_session_binds_account() {
        let client = JmapClient::with_session(session(), "token".to_string()).unwrap();
        assert_eq!(client.account_id(), "u1138");
        assert_eq!(client.session().username, "ness@onett.example.com");
    }

    #[test]
    fn test_session_url() {
        let url = JmapClient::session_url("jmap.example.com").unwrap();
        assert_eq!(url.as_str(), "https://jmap.example.com/.well-known/jmap");
        assert!(JmapClient::session_url("bad host").is_err());
    }
}
