use serde::{Deserialize, Serialize};

/// Failure categories surfaced to callers of the agent pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The oracle reply was not parseable JSON.
    MalformedOutput,
    /// The reply parsed but carried no action this domain understands.
    UnknownAction,
    /// A required field was missing or unusable; no remote call was made.
    ValidationFailed,
    /// The referenced event, message or task does not exist.
    NotFound,
    /// The remote service (or the oracle) answered with an error.
    RemoteRejected,
    /// No usable credentials for the remote service.
    RemoteUnavailable,
}

impl ErrorKind {
    /// Message shown to the end user when nothing more specific is available.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::MalformedOutput => "Could not read the assistant's reply. Please try again.",
            ErrorKind::UnknownAction => "Could not understand the request.",
            ErrorKind::ValidationFailed => "The request is missing required details.",
            ErrorKind::NotFound => "Nothing matched the request.",
            ErrorKind::RemoteRejected => "The service rejected the request.",
            ErrorKind::RemoteUnavailable => "Google account is not connected.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::MalformedOutput => "MalformedOutput",
            ErrorKind::UnknownAction => "UnknownAction",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::RemoteRejected => "RemoteRejected",
            ErrorKind::RemoteUnavailable => "RemoteUnavailable",
        };
        f.write_str(name)
    }
}

/// Failure to turn an oracle reply into a normalized intent.
///
/// `raw` always holds the reply exactly as received so it can be logged.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct ParseError {
    pub kind: ErrorKind,
    pub raw: String,
    pub detail: String,
}

impl ParseError {
    pub fn malformed(raw: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MalformedOutput,
            raw: raw.to_string(),
            detail: detail.into(),
        }
    }

    pub fn unknown_action(raw: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::UnknownAction,
            raw: raw.to_string(),
            detail: detail.into(),
        }
    }

    pub fn invalid(raw: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValidationFailed,
            raw: raw.to_string(),
            detail: detail.into(),
        }
    }

    /// Text safe to show the user; never includes the raw reply.
    pub fn user_message(&self) -> String {
        match self.kind {
            ErrorKind::ValidationFailed => format!("Invalid request: {}", self.detail),
            kind => kind.user_message().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_serializes_by_name() {
        let json = serde_json::to_string(&ErrorKind::RemoteUnavailable).unwrap();
        assert_eq!(json, "\"RemoteUnavailable\"");
    }

    #[test]
    fn malformed_user_message_hides_raw_text() {
        let err = ParseError::malformed("not json <secret>", "expected value at line 1");
        assert_eq!(err.raw, "not json <secret>");
        assert!(!err.user_message().contains("secret"));
    }
}
