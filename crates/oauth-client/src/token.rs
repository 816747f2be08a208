//! Access token entity.

use crate::error::TokenError;
use crate::secret::{ExposeSecret, SecretString};
use chrono::{DateTime, Utc};
use std::fmt;

/// A bearer token value together with its absolute expiry.
///
/// Immutable once built; a refresh replaces the whole value. The token value
/// is never empty.
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::InvalidResponse` if `value` is empty.
    pub fn new(
        value: impl Into<SecretString>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, TokenError> {
        let value = value.into();
        if value.expose_secret().is_empty() {
            return Err(TokenError::InvalidResponse(
                "access token value is empty".into(),
            ));
        }
        Ok(Self { value, expires_at })
    }

    /// The raw bearer token value.
    #[must_use]
    pub fn value(&self) -> &SecretString {
        &self.value
    }

    /// The UTC instant at which the token stops being usable.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_empty_value_rejected() {
        let result = AccessToken::new(String::new(), at(60));
        assert!(matches!(result, Err(TokenError::InvalidResponse(_))));
    }

    #[test]
    fn test_is_expired_boundary() {
        let token = AccessToken::new("T1".to_string(), at(50)).unwrap();

        assert!(!token.is_expired(at(49)));
        assert!(token.is_expired(at(50)));
        assert!(token.is_expired(at(51)));
    }

    #[test]
    fn test_expires_at_now_is_immediately_expired() {
        let now = at(0);
        let token = AccessToken::new("T1".to_string(), now).unwrap();
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn test_debug_redacts_value() {
        let token = AccessToken::new("super-secret-access-token".to_string(), at(60)).unwrap();
        let debug_str = format!("{token:?}");

        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super-secret-access-token"));
        assert!(debug_str.contains("expires_at"));
    }
}
