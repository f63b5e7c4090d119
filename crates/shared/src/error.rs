//! Normalized client-side error type.
//!
//! Every failure surfaced by the HTTP client collapses into [`ApiError`], which
//! renders to the same `{success: false, message, errors?}` shape the backend
//! uses for its own failures, so pages only ever handle one error format.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Used when neither the server nor the transport supplied a message.
pub const FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

/// Broad class of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The request never reached the server or never came back.
    Network,
    /// The server answered with a non-success status (validation, business rules, ...).
    Http,
    /// Authentication could not be recovered; the session has been terminated.
    SessionExpired,
    /// The response body did not match the expected shape.
    Deserialize,
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
    pub errors: Option<serde_json::Value>,
}

/// The wire shape of a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

/// The subset of a failure body we read.
#[derive(Debug, Default, Deserialize)]
struct ServerFailure {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<serde_json::Value>,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            status: None,
            message: non_empty_or_fallback(message.into()),
            errors: None,
        }
    }

    pub fn deserialize(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Deserialize,
            status: None,
            message: non_empty_or_fallback(message.into()),
            errors: None,
        }
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::SessionExpired,
            status: Some(401),
            message: non_empty_or_fallback(message.into()),
            errors: None,
        }
    }

    /// A `success: false` envelope delivered with a success status.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Http,
            status: None,
            message: non_empty_or_fallback(message.into()),
            errors: None,
        }
    }

    /// Normalize a non-success HTTP response.
    ///
    /// The server's `message` wins; otherwise a status line is used.
    pub fn from_response(status: u16, body: &str) -> Self {
        let failure = serde_json::from_str::<ServerFailure>(body).unwrap_or_default();
        let message = failure
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status code {status}"));

        Self {
            kind: ErrorKind::Http,
            status: Some(status),
            message,
            errors: failure.errors,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            message: self.message.clone(),
            errors: self.errors.clone(),
        }
    }
}

fn non_empty_or_fallback(message: String) -> String {
    if message.trim().is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        message
    }
}
