//! Configuration loading for the responder
//!
//! Credentials are loaded from (in order of priority):
//! 1. JSON file (~/.config/responder/jmap.json)
//! 2. Runtime environment variables (`JMAP_HOST`, `JMAP_API_TOKEN`)
//!
//! Mailbox names and reply behaviour come from an optional
//! `settings.json` in the same directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Credentials filename in the responder config directory
const CREDENTIALS_FILE: &str = "jmap.json";

/// Settings filename in the responder config directory
const SETTINGS_FILE: &str = "settings.json";

/// API token credentials for a JMAP server
#[derive(Clone, Deserialize)]
pub struct JmapCredentials {
    /// Host serving `/.well-known/jmap`, e.g. `api.fastmail.com`
    pub host: String,
    pub api_token: String,
}

impl std::fmt::Debug for JmapCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JmapCredentials")
            .field("host", &self.host)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl JmapCredentials {
    /// Load credentials from the config file, falling back to the
    /// environment
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: Self = config::load_json(CREDENTIALS_FILE)?;
            return creds.validated();
        }

        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: Self = config::load_json_file(path)?;
        creds.validated()
    }

    /// Parse credentials from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: Self =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        creds.validated()
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let host =
            std::env::var("JMAP_HOST").context("JMAP_HOST environment variable not set")?;
        let api_token = std::env::var("JMAP_API_TOKEN")
            .context("JMAP_API_TOKEN environment variable not set")?;

        Self { host, api_token }.validated()
    }

    fn validated(self) -> Result<Self> {
        anyhow::ensure!(!self.host.trim().is_empty(), "JMAP host is empty");
        anyhow::ensure!(!self.api_token.trim().is_empty(), "JMAP API token is empty");
        Ok(self)
    }

    /// Get the default credentials file path (~/.config/responder/jmap.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (file or env vars)
    pub fn is_available() -> bool {
        config::config_exists(CREDENTIALS_FILE)
            || (std::env::var("JMAP_HOST").is_ok() && std::env::var("JMAP_API_TOKEN").is_ok())
    }
}

/// Account-specific mailbox names and reply behaviour
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponderSettings {
    /// Mailbox replied-to messages are archived out of
    pub inbox_name: String,
    /// Mailbox drafts are created in
    pub drafts_name: String,
    /// Mailbox a sent reply is moved to when a copy is kept
    pub sent_name: String,
    /// Keep a copy of each reply in the sent mailbox instead of destroying
    /// the draft after submission
    pub keep_sent_copy: bool,
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            inbox_name: "Inbox".to_string(),
            drafts_name: "Drafts".to_string(),
            sent_name: "Sent".to_string(),
            keep_sent_copy: true,
        }
    }
}

impl ResponderSettings {
    /// Load `settings.json`, or the defaults when the file does not exist
    pub fn load() -> Result<Self> {
        config::load_json_or_default(SETTINGS_FILE)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }
}
