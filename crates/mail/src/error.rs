//! Error types for the mail crate

/// Errors produced by the reply engine and the JMAP client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local configuration does not match the remote account
    /// (ambiguous mailbox name, missing required mailbox, empty name)
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No identity found matching any recipient of message {message_id}")]
    NoMatchingIdentity { message_id: String },

    /// Malformed or failed remote response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A method call in a batch returned an `error` response
    #[error("Method {method} failed: {kind}{}", description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Method {
        method: String,
        kind: String,
        description: Option<String>,
    },

    /// The send transaction did not yield a created submission
    #[error("Submission error: {0}")]
    Submission(String),

    #[error("HTTP error: {0}")]
    Http(#[from] ureq::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn submission(message: impl Into<String>) -> Self {
        Self::Submission(message.into())
    }

    /// Whether the error came from a bad or failed remote response
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Method { .. } | Self::Json(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_error_display() {
        let err = Error::Method {
            method: "Email/changes".to_string(),
            kind: "cannotCalculateChanges".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "Method Email/changes failed: cannotCalculateChanges");

        let err = Error::Method {
            method: "Email/get".to_string(),
            kind: "invalidArguments".to_string(),
            description: Some("bad ids".to_string()),
        };
        assert_eq!(err.to_string(), "Method Email/get failed: invalidArguments (bad ids)");
        assert!(err.is_protocol());
    }

    #[test]
    fn test_classification() {
        assert!(Error::protocol("x").is_protocol());
        assert!(!Error::configuration("x").is_protocol());
        assert!(!Error::submission("x").is_protocol());
    }
}
