//! Token fetcher contract and HTTP implementation.
//!
//! A [`TokenFetcher`] performs one token request for a set of options and
//! turns the endpoint's answer into an [`AccessToken`]. It never retries;
//! callers decide what to do with a failure.
//!
//! # Request
//!
//! `POST` to the token endpoint with an `application/x-www-form-urlencoded`
//! body:
//!
//! - `grant_type=client_credentials`, `client_id`, `client_secret`
//! - `scope` and `audience` when configured and non-blank
//! - every additional body parameter, which may replace `scope` or
//!   `audience` but never the three fields above
//!
//! # Expiry
//!
//! A missing or non-positive `expires_in` yields a token that is expired the
//! moment it is issued. Otherwise the expiry is `now + expires_in`, shortened
//! by the refresh margin only when `0 < margin < expires_in`.
//!
//! # Security
//!
//! - The client secret and token values are never logged
//! - Error response bodies are logged at trace level only
//! - Every request carries a timeout

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;
use crate::options::ClientCredentialsOptions;
use crate::secret::ExposeSecret;
use crate::token::AccessToken;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, trace, warn};

/// Connection timeout for the shared HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Form fields that additional body parameters cannot replace.
const RESERVED_FIELDS: [&str; 3] = ["grant_type", "client_id", "client_secret"];

/// Requests access tokens from an authorization server.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Request a new token using `options`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::HttpError`, `TokenError::AuthenticationRejected`
    /// or `TokenError::InvalidResponse` when the endpoint cannot be reached
    /// or returns an unusable answer.
    async fn request_token(
        &self,
        options: &ClientCredentialsOptions,
    ) -> Result<AccessToken, TokenError>;
}

// =============================================================================
// OAuth Response Types
// =============================================================================

/// JSON payload returned by a token endpoint.
#[derive(Deserialize)]
struct TokenEndpointResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[allow(dead_code)]
    #[serde(default)]
    token_type: Option<String>,
}

impl fmt::Debug for TokenEndpointResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenEndpointResponse")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

// =============================================================================
// Request construction
// =============================================================================

/// Build the form fields for a client-credentials token request.
///
/// The returned map contains the client secret in clear text.
#[must_use]
pub fn build_form_body(options: &ClientCredentialsOptions) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    if let Some(scope) = options.scope.as_deref().filter(|s| !s.trim().is_empty()) {
        fields.insert("scope".to_string(), scope.to_string());
    }
    if let Some(audience) = options.audience.as_deref().filter(|a| !a.trim().is_empty()) {
        fields.insert("audience".to_string(), audience.to_string());
    }

    for (key, value) in &options.additional_body_parameters {
        if RESERVED_FIELDS.contains(&key.as_str()) {
            warn!(
                target: "oauth_client.fetcher",
                field = %key,
                "Ignoring additional body parameter that would replace a mandatory field"
            );
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    // Mandatory fields last so nothing above can replace them.
    fields.insert("grant_type".to_string(), "client_credentials".to_string());
    fields.insert("client_id".to_string(), options.client_id.clone());
    fields.insert(
        "client_secret".to_string(),
        options.client_secret.expose_secret().to_string(),
    );

    fields
}

/// Convert the configured additional headers into a header map.
///
/// # Errors
///
/// Returns `TokenError::Configuration` for a header name or value that is
/// not valid HTTP.
pub fn build_headers(options: &ClientCredentialsOptions) -> Result<HeaderMap, TokenError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &options.additional_headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TokenError::Configuration(format!("invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| TokenError::Configuration(format!("invalid value for header {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Compute the absolute expiry for a token issued at `now`.
#[must_use]
pub fn compute_expires_at(
    now: DateTime<Utc>,
    expires_in_secs: Option<i64>,
    refresh_before_expiration: Duration,
) -> DateTime<Utc> {
    let lifetime_secs = match expires_in_secs {
        Some(secs) if secs > 0 => secs,
        _ => return now,
    };

    #[allow(clippy::cast_sign_loss)]
    let lifetime = Duration::from_secs(lifetime_secs as u64);
    let effective = if !refresh_before_expiration.is_zero() && refresh_before_expiration < lifetime
    {
        lifetime - refresh_before_expiration
    } else {
        lifetime
    };

    chrono::Duration::from_std(effective)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// =============================================================================
// HTTP fetcher
// =============================================================================

/// [`TokenFetcher`] that talks to a real token endpoint over HTTP.
#[derive(Clone)]
pub struct HttpTokenFetcher {
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for HttpTokenFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenFetcher").finish_non_exhaustive()
    }
}

impl HttpTokenFetcher {
    /// Create a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TokenError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http_client))
    }

    /// Create a fetcher around an existing HTTP client.
    #[must_use]
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use `clock` when computing token expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    #[instrument(skip_all, fields(client_id = %options.client_id))]
    async fn request_token(
        &self,
        options: &ClientCredentialsOptions,
    ) -> Result<AccessToken, TokenError> {
        debug!(
            target: "oauth_client.fetcher",
            endpoint = %options.token_endpoint,
            "Requesting token with client credentials"
        );

        let mut request = self
            .http_client
            .post(&options.token_endpoint)
            .headers(build_headers(options)?)
            .form(&build_form_body(options));
        // A zero timeout means the request is bounded only by the connect timeout.
        if !options.timeout.is_zero() {
            request = request.timeout(options.timeout);
        }

        let response = request.send().await.map_err(|e| {
            debug!(target: "oauth_client.fetcher", error = %e, "HTTP request failed");
            TokenError::HttpError(e.to_string())
        })?;

        let status = response.status();

        if status.is_success() {
            let payload: TokenEndpointResponse = response.json().await.map_err(|e| {
                warn!(target: "oauth_client.fetcher", error = %e, "Failed to parse token response");
                TokenError::InvalidResponse(e.to_string())
            })?;

            let access_token = payload
                .access_token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    warn!(target: "oauth_client.fetcher", "Token response has no access_token");
                    TokenError::InvalidResponse("missing access_token".into())
                })?;

            let expires_at = compute_expires_at(
                self.clock.now(),
                payload.expires_in,
                options.refresh_before_expiration,
            );

            debug!(
                target: "oauth_client.fetcher",
                expires_in_secs = ?payload.expires_in,
                expires_at = %expires_at,
                "Token acquired successfully"
            );

            AccessToken::new(access_token, expires_at)
        } else if status.as_u16() == 401 || status.as_u16() == 400 {
            let body = response.text().await.unwrap_or_else(|e| {
                trace!(target: "oauth_client.fetcher", error = %e, "Failed to read error response body");
                "<failed to read body>".to_string()
            });
            warn!(
                target: "oauth_client.fetcher",
                status = %status,
                "Authentication rejected by token endpoint"
            );
            trace!(
                target: "oauth_client.fetcher",
                body = %body,
                "Authentication rejection response body"
            );
            Err(TokenError::AuthenticationRejected(format!(
                "Status {status}"
            )))
        } else if status.is_server_error() {
            warn!(
                target: "oauth_client.fetcher",
                status = %status,
                "Token endpoint returned server error"
            );
            Err(TokenError::HttpError(format!(
                "Token endpoint server error: {status}"
            )))
        } else {
            warn!(
                target: "oauth_client.fetcher",
                status = %status,
                "Unexpected response from token endpoint"
            );
            Err(TokenError::HttpError(format!(
                "Unexpected status: {status}"
            )))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
