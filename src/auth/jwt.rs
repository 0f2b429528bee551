//! Reading the claims embedded in a JWT access token.
//!
//! Only the payload segment is decoded. Signatures are the backend's
//! business; the client only needs `exp` to decide whether a token is worth
//! presenting.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The subset of registered claims the client cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("token must have 3 segments, found {0}")]
    Segments(usize),
    #[error("token payload is not base64url: {0}")]
    Encoding(String),
    #[error("token payload is not a claims object: {0}")]
    Claims(String),
}

/// Decodes the payload segment of `token`.
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Segments(segments.len()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| TokenError::Encoding(e.to_string()))?;

    serde_json::from_slice(&payload).map_err(|e| TokenError::Claims(e.to_string()))
}

/// Expiry instant of `token`, or `None` if it cannot be read.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_claims(token).ok()?;
    DateTime::from_timestamp(claims.exp, 0)
}

/// A token is expired at `now` unless it decodes and `now < exp`.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => now >= exp,
        None => true,
    }
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Builds an unsigned token carrying `claims`.
///
/// Used by the in-memory backend and tests; real tokens come from the server.
pub fn encode_unsigned(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    // Claims only hold strings and integers, serialization cannot fail.
    let payload = serde_json::to_vec(claims).unwrap_or_default();
    format!("{}.{}.", header, URL_SAFE_NO_PAD.encode(payload))
}

#[cfg(test)]
pub(crate) fn token_expiring_in(seconds: i64) -> String {
    encode_unsigned(&Claims {
        exp: Utc::now().timestamp() + seconds,
        sub: Some("1".to_string()),
        jti: None,
    })
}
