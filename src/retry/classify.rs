//! Per-attempt outcome classification.
//!
//! | Attempt result              | Outcome             | Retry? |
//! |-----------------------------|---------------------|--------|
//! | timeout                     | `TransportError`    | yes    |
//! | connect / other transport   | `TransportError`    | no     |
//! | status 400–499              | `ClientError`       | no     |
//! | status 500–599              | `ServerError`       | yes    |
//! | other status, non-JSON body | `MalformedResponse` | no     |
//! | other status, JSON body     | `Success`           | —      |

use serde_json::Value;

use crate::transport::{HttpResponse, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Success(Value),
    ClientError { status: u16, body: String },
    ServerError { status: u16, body: String },
    TransportError(TransportError),
    MalformedResponse { body: String },
}

impl CallOutcome {
    pub fn from_response(resp: HttpResponse) -> Self {
        match resp.status {
            400..=499 => CallOutcome::ClientError {
                status: resp.status,
                body: resp.body,
            },
            500..=599 => CallOutcome::ServerError {
                status: resp.status,
                body: resp.body,
            },
            _ => match serde_json::from_str::<Value>(&resp.body) {
                Ok(data) => CallOutcome::Success(data),
                Err(_) => CallOutcome::MalformedResponse { body: resp.body },
            },
        }
    }

    pub fn from_result(result: Result<HttpResponse, TransportError>) -> Self {
        match result {
            Ok(resp) => Self::from_response(resp),
            Err(err) => CallOutcome::TransportError(err),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CallOutcome::ServerError { .. } => true,
            CallOutcome::TransportError(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Short tag for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            CallOutcome::Success(_) => "success",
            CallOutcome::ClientError { .. } => "client_error",
            CallOutcome::ServerError { .. } => "server_error",
            CallOutcome::TransportError(TransportError::Timeout(_)) => "timeout",
            CallOutcome::TransportError(TransportError::Connect(_)) => "connect_error",
            CallOutcome::TransportError(_) => "transport_error",
            CallOutcome::MalformedResponse { .. } => "malformed_response",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CallOutcome::ClientError { status, .. } | CallOutcome::ServerError { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(status: u16, body: &str) -> CallOutcome {
        CallOutcome::from_response(HttpResponse::new(status, body))
    }

    #[test]
    fn test_status_ranges() {
        assert!(matches!(outcome(400, "bad"), CallOutcome::ClientError { status: 400, .. }));
        assert!(matches!(outcome(499, ""), CallOutcome::ClientError { status: 499, .. }));
        assert!(matches!(outcome(500, ""), CallOutcome::ServerError { status: 500, .. }));
        assert!(matches!(outcome(599, ""), CallOutcome::ServerError { status: 599, .. }));
    }

    #[test]
    fn test_success_requires_json() {
        assert_eq!(
            outcome(200, r#"{"ok":true}"#),
            CallOutcome::Success(serde_json::json!({"ok": true}))
        );
        assert_eq!(
            outcome(200, "<html>"),
            CallOutcome::MalformedResponse { body: "<html>".into() }
        );
        assert!(matches!(outcome(204, ""), CallOutcome::MalformedResponse { .. }));
    }

    #[test]
    fn test_retryable_classes() {
        assert!(outcome(503, "").is_retryable());
        assert!(!outcome(404, "").is_retryable());
        assert!(!outcome(200, "nope").is_retryable());
        assert!(!outcome(200, "{}").is_retryable());

        let timeout = CallOutcome::TransportError(TransportError::Timeout(Duration::from_secs(10)));
        assert!(timeout.is_retryable());
        assert_eq!(timeout.label(), "timeout");

        let refused = CallOutcome::TransportError(TransportError::Connect("refused".into()));
        assert!(!refused.is_retryable());
        assert_eq!(refused.label(), "connect_error");
    }
}
