//! Error type for token acquisition and management.

use thiserror::Error;

/// Errors that can occur while obtaining or managing access tokens.
///
/// The type is `Clone` so that a single refresh failure can be handed to
/// every caller that was waiting on the same refresh gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Missing or invalid client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Transport failure or unexpected status from the token endpoint.
    #[error("HTTP client error: {0}")]
    HttpError(String),

    /// Credentials rejected by the token endpoint (401, 400).
    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// Token endpoint returned an unusable payload.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Token endpoint returned a token that is already expired.
    #[error("Token endpoint returned an already expired access token")]
    AlreadyExpired,

    /// No manager is registered under the requested client name.
    #[error("Unknown client: {0}")]
    UnknownClient(String),

    /// The caller's cancellation signal fired.
    #[error("Token acquisition cancelled")]
    Cancelled,
}

impl TokenError {
    /// Whether this error came from the fetch step (network, status, payload).
    #[must_use]
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_) | Self::AuthenticationRejected(_) | Self::InvalidResponse(_)
        )
    }
}
