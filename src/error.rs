//! Errors raised by calls against the clinic backend.

use serde_json::Value;

/// Failure of a backend call.
///
/// Only [`ApiError::Unauthorized`] is ever recovered (once) by the auth-retry
/// wrapper. Every other variant passes through untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The session is gone: no usable refresh token, or the refresh failed.
    #[error("Session expired. Please log in again.")]
    AuthExpired,
    /// The backend rejected the bearer token (HTTP 401).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// Transport-level failure (connection refused, timeout, reset).
    #[error("Network error: {0}")]
    Network(String),
    /// The backend rejected the payload (HTTP 400/422).
    #[error("Validation failed ({status}): {message}")]
    Validation { status: u16, message: String },
    /// The addressed resource does not exist (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),
    /// Any other non-success status.
    #[error("Server returned {status}: {message}")]
    Http { status: u16, message: String },
    /// The response body could not be decoded.
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Maps a non-success HTTP status and its body to an error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = error_message(body);
        match status {
            401 => ApiError::Unauthorized(message),
            400 | 422 => ApiError::Validation { status, message },
            404 => ApiError::NotFound(message),
            _ => ApiError::Http { status, message },
        }
    }

    /// True for the HTTP 401 case, the only one that triggers a refresh.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Whether the backend refused the credentials themselves.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized(_)
                | ApiError::Validation { .. }
                | ApiError::Http { status: 403, .. }
        )
    }

    /// Collapses credential rejections into [`ApiError::AuthExpired`].
    pub(crate) fn into_session_error(self) -> Self {
        if self.is_credential_rejection() {
            ApiError::AuthExpired
        } else {
            self
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::from_status(status.as_u16(), "")
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Pulls a human readable message out of an error body.
///
/// Understands `{"detail": ..}`, `{"message": ..}` and `{"error": ..}`
/// objects; anything else is returned trimmed as-is.
fn error_message(body: &str) -> String {
    let body = body.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(Value::String(msg)) = map.get(key) {
                return msg.clone();
            }
        }
    }
    if body.is_empty() {
        "no details".to_string()
    } else {
        body.to_string()
    }
}
