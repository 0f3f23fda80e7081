//! Access token payload issued by the bakery backend.

use core::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Errors that can occur when validating an [`AuthPayload`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthPayloadError {
    /// The access token is empty.
    #[error("access token cannot be empty")]
    EmptyToken,
    /// The expiry timestamp could not be parsed.
    #[error("invalid expiry timestamp: {0}")]
    InvalidExpiry(String),
}

/// An access token together with its expiry, as returned by login/register.
///
/// The payload is considered valid only while `expires_at` parses and lies in
/// the future. Validity is always computed against the clock at the time of
/// the check, never cached.
///
/// ## Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use union_bakery_core::AuthPayload;
///
/// let payload = AuthPayload::new("tok", (Utc::now() + Duration::hours(1)).to_rfc3339());
/// assert!(payload.is_valid());
///
/// let expired = AuthPayload::new("tok", "2001-01-01T00:00:00Z");
/// assert!(!expired.is_valid());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    /// Opaque bearer token, sent verbatim in the `Authorization` header.
    pub access_token: String,
    /// ISO-8601 expiry timestamp.
    pub expires_at: String,
}

impl AuthPayload {
    /// Create a new payload.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_at: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: expires_at.into(),
        }
    }

    /// Parse the expiry timestamp.
    ///
    /// Accepts RFC 3339 timestamps, and naive `YYYY-MM-DDTHH:MM:SS[.fff]`
    /// timestamps which are interpreted as UTC.
    #[must_use]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.expires_at)
    }

    /// Whether the token is still valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.trim().is_empty() && self.expiry().is_some_and(|expiry| now < expiry)
    }

    /// Whether the token is still valid right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Check the payload shape (token present, expiry parseable).
    ///
    /// This does not check whether the token has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or the expiry does not parse.
    pub fn validate(&self) -> Result<(), AuthPayloadError> {
        if self.access_token.trim().is_empty() {
            return Err(AuthPayloadError::EmptyToken);
        }
        if self.expiry().is_none() {
            return Err(AuthPayloadError::InvalidExpiry(self.expires_at.clone()));
        }
        Ok(())
    }
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Parse an ISO-8601 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_future_expiry_is_valid() {
        let now = Utc::now();
        let payload = AuthPayload::new("token", (now + Duration::minutes(5)).to_rfc3339());
        assert!(payload.is_valid_at(now));
    }

    #[test]
    fn test_past_expiry_is_invalid() {
        let now = Utc::now();
        let payload = AuthPayload::new("token", (now - Duration::seconds(1)).to_rfc3339());
        assert!(!payload.is_valid_at(now));
    }

    #[test]
    fn test_unparseable_expiry_is_invalid() {
        let payload = AuthPayload::new("token", "tomorrow-ish");
        assert!(!payload.is_valid());
        assert!(matches!(
            payload.validate(),
            Err(AuthPayloadError::InvalidExpiry(_))
        ));
    }

    #[test]
    fn test_empty_token_rejected() {
        let payload = AuthPayload::new("  ", "2999-01-01T00:00:00Z");
        assert_eq!(payload.validate(), Err(AuthPayloadError::EmptyToken));
        assert!(!payload.is_valid());
    }

    #[test]
    fn test_naive_timestamp_treated_as_utc() {
        let parsed = parse_timestamp("2030-06-01T10:00:00.000").expect("parses");
        assert_eq!(parsed.to_rfc3339(), "2030-06-01T10:00:00+00:00");
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = r#"{"accessToken":"abc","expiresAt":"2030-01-01T00:00:00Z"}"#;
        let payload: AuthPayload = serde_json::from_str(json).expect("deserializes");
        assert_eq!(payload.access_token, "abc");
        assert!(serde_json::to_string(&payload).expect("serializes").contains("expiresAt"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let payload = AuthPayload::new("super-secret-token", "2030-01-01T00:00:00Z");
        let debug = format!("{payload:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
