//! Routes a normalized intent to exactly one remote operation.

pub mod calendar;
pub mod email;
pub mod tasks;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::date_context::DateContext;
use super::intent::NormalizedIntent;
use super::oracle::OracleError;
use crate::error::{ErrorKind, ParseError};
use crate::google::{RemoteClients, RemoteError};

/// Uniform envelope returned by every dispatch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    pub payload: Option<Value>,
    pub message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Raw detail for the logs; never sent to clients.
    #[serde(skip)]
    pub diagnostic: Option<String>,
}

impl ActionResult {
    pub fn success(payload: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            message: Some(message.into()),
            error_kind: None,
            diagnostic: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            message: Some(message.into()),
            error_kind: Some(kind),
            diagnostic: None,
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}

impl From<&ParseError> for ActionResult {
    fn from(err: &ParseError) -> Self {
        ActionResult::failure(err.kind, err.user_message())
            .with_diagnostic(format!("{} | raw reply: {}", err.detail, err.raw))
    }
}

impl From<&OracleError> for ActionResult {
    fn from(err: &OracleError) -> Self {
        ActionResult::failure(err.kind(), err.kind().user_message()).with_diagnostic(err.to_string())
    }
}

impl From<&RemoteError> for ActionResult {
    fn from(err: &RemoteError) -> Self {
        ActionResult::failure(err.kind(), err.to_string())
    }
}

/// Failure raised inside a domain dispatcher; converted to an `ActionResult` at the edge.
#[derive(Debug)]
pub(crate) struct Failure {
    kind: ErrorKind,
    message: String,
}

impl Failure {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ValidationFailed,
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }
}

impl From<RemoteError> for Failure {
    fn from(err: RemoteError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Failure> for ActionResult {
    fn from(failure: Failure) -> Self {
        ActionResult::failure(failure.kind, failure.message)
    }
}

pub(crate) type Outcome = Result<ActionResult, Failure>;

/// Run one normalized intent against the remote services.
pub async fn dispatch(
    intent: &NormalizedIntent,
    clients: &RemoteClients,
    ctx: &DateContext,
    tz_name: &str,
) -> ActionResult {
    let outcome = match intent {
        NormalizedIntent::Calendar(intent) => {
            calendar::dispatch(intent, clients.calendar.as_ref(), ctx, tz_name).await
        }
        NormalizedIntent::Email(intent) => email::dispatch(intent, clients.mail.as_ref()).await,
        NormalizedIntent::Tasks(intent) => tasks::dispatch(intent, clients.tasks.as_ref()).await,
    };

    let domain = intent.domain();
    let action = intent.action();
    match outcome {
        Ok(result) => {
            info!(%domain, action, "Action completed");
            result
        }
        Err(failure) => {
            warn!(%domain, action, kind = %failure.kind, message = %failure.message, "Action failed");
            failure.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diagnostic_is_never_serialized() {
        let err = ParseError::malformed("not json", "expected value");
        let result = ActionResult::from(&err);
        assert_eq!(result.error_kind, Some(ErrorKind::MalformedOutput));
        assert!(result.diagnostic.as_deref().unwrap().contains("not json"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({
                "success": false,
                "payload": null,
                "message": "Could not read the assistant's reply. Please try again.",
                "errorKind": "MalformedOutput"
            })
        );
    }

    #[test]
    fn remote_failures_keep_remote_message() {
        let failure = Failure::from(RemoteError::Api {
            status: 400,
            message: "Invalid start time.".into(),
        });
        let result = ActionResult::from(failure);
        assert_eq!(result.error_kind, Some(ErrorKind::RemoteRejected));
        assert_eq!(result.message.as_deref(), Some("API error 400: Invalid start time."));
    }
}
