//! Sending identities configured on the account

use serde::{Deserialize, Serialize};

use super::EmailAddress;

/// Unique identifier for an identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A sending persona as returned by `Identity/get`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: IdentityId,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub reply_to: Option<Vec<EmailAddress>>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new(id),
            name: String::new(),
            email: email.into(),
            reply_to: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_identity() {
        let json = r#"{
            "id": "ID1",
            "name": "Ness",
            "email": "ness@onett.example.com",
            "replyTo": [{ "name": null, "email": "ness@onett.example.com" }],
            "mayDelete": false
        }"#;

        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.id.as_str(), "ID1");
        assert_eq!(identity.email, "ness@onett.example.com");
        assert_eq!(identity.reply_to.unwrap().len(), 1);
    }
}
