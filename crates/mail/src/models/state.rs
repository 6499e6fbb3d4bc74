//! Account state tokens and push notifications

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Data type name for email state in JMAP type states
pub const EMAIL_TYPE: &str = "Email";

/// Opaque per-type state string issued by the server
///
/// Tokens carry no ordering; only equality is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateToken(String);

impl StateToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StateToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for StateToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Data type name -> state token, as reported for one account
pub type TypeState = HashMap<String, StateToken>;

/// A `StateChange` push notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Account ID -> type states that changed for that account
    #[serde(default)]
    pub changed: HashMap<String, TypeState>,
}

impl StateChange {
    /// Build a notification carrying a single Email state for one account
    pub fn email(account_id: impl Into<String>, token: impl Into<String>) -> Self {
        let mut types = TypeState::new();
        types.insert(EMAIL_TYPE.to_string(), StateToken::new(token));
        let mut changed = HashMap::new();
        changed.insert(account_id.into(), types);
        Self { changed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_change() {
        let json = r#"{
            "@type": "StateChange",
            "changed": {
                "u1138": { "Email": "2187", "Mailbox": "42" }
            }
        }"#;

        let change: StateChange = serde_json::from_str(json).unwrap();
        let types = &change.changed["u1138"];
        assert_eq!(types[EMAIL_TYPE], StateToken::new("2187"));
        assert_eq!(types["Mailbox"].as_str(), "42");
    }

    #[test]
    fn test_email_helper() {
        let change = StateChange::email("u1", "s1");
        assert_eq!(change.changed["u1"][EMAIL_TYPE].as_str(), "s1");
    }
}
