//! OAuth 2.0 Client Credentials Token Manager.
//!
//! One [`ClientCredentialsTokenManager`] exists per client name. It hands out
//! the cached token while it is fresh and refreshes it through the fetcher
//! when it is missing or expired.
//!
//! # Refresh protocol
//!
//! 1. Read the cache without taking any lock. A fresh token is returned
//!    immediately.
//! 2. Otherwise wait for the client's refresh gate (one holder at a time).
//! 3. Re-read the cache under the gate: a caller that waited behind a
//!    successful refresh gets that token without fetching again.
//! 4. If the refresh that ran while this caller was waiting failed, return
//!    that failure instead of hitting the endpoint again.
//! 5. Otherwise look up the *current* options, fetch, reject a token that is
//!    already expired, store it and return it.
//!
//! A failed refresh caches nothing and leaves the client ready for the next
//! call to try again. The gate guard is dropped on every exit path.
//!
//! # Cancellation
//!
//! The caller's [`CancellationToken`] aborts waiting for the gate and aborts
//! the caller's own fetch. It has no effect on a refresh run by another
//! caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth_client::{ClientCredentialsTokenManager, InMemoryTokenCache, HttpTokenFetcher};
//! use tokio_util::sync::CancellationToken;
//! use std::sync::Arc;
//!
//! let manager = ClientCredentialsTokenManager::new(
//!     "sample-api",
//!     options_provider,
//!     Arc::new(HttpTokenFetcher::new()?),
//!     Arc::new(InMemoryTokenCache::new()),
//! )?;
//!
//! let token = manager.get_access_token(&CancellationToken::new()).await?;
//! let header = format!("Bearer {}", token.expose_secret());
//! ```

use crate::cache::TokenCache;
use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;
use crate::fetcher::TokenFetcher;
use crate::options::OptionsProvider;
use crate::secret::SecretString;
use crate::token::AccessToken;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

/// Supplies bearer token values to outgoing requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Return a currently valid access token value.
    ///
    /// # Errors
    ///
    /// Returns the fetch failure, `TokenError::AlreadyExpired` or
    /// `TokenError::Cancelled`.
    async fn access_token(&self, cancel: &CancellationToken) -> Result<SecretString, TokenError>;
}

/// State owned by whoever holds the refresh gate.
#[derive(Default)]
struct RefreshState {
    /// Attempt number and error of the most recent failed refresh.
    last_failure: Option<(u64, TokenError)>,
}

/// Per-client token coordinator with single-flight refresh.
pub struct ClientCredentialsTokenManager {
    name: String,
    options: Arc<dyn OptionsProvider>,
    fetcher: Arc<dyn TokenFetcher>,
    cache: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
    refresh_gate: Mutex<RefreshState>,
    /// Number of refresh attempts that ran to completion. Written under the gate.
    completed_attempts: AtomicU64,
}

impl fmt::Debug for ClientCredentialsTokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsTokenManager")
            .field("name", &self.name)
            .field(
                "completed_attempts",
                &self.completed_attempts.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl ClientCredentialsTokenManager {
    /// Create a manager for `name` using the system clock.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if `name` is empty.
    pub fn new(
        name: impl Into<String>,
        options: Arc<dyn OptionsProvider>,
        fetcher: Arc<dyn TokenFetcher>,
        cache: Arc<dyn TokenCache>,
    ) -> Result<Self, TokenError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TokenError::Configuration(
                "client name must not be empty".into(),
            ));
        }
        Ok(Self::with_checked_name(name, options, fetcher, cache))
    }

    /// Construct for a name the caller has already validated as non-empty.
    pub(crate) fn with_checked_name(
        name: String,
        options: Arc<dyn OptionsProvider>,
        fetcher: Arc<dyn TokenFetcher>,
        cache: Arc<dyn TokenCache>,
    ) -> Self {
        Self {
            name,
            options,
            fetcher,
            cache,
            clock: Arc::new(SystemClock),
            refresh_gate: Mutex::new(RefreshState::default()),
            completed_attempts: AtomicU64::new(0),
        }
    }

    /// Use `clock` for expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The client name this manager serves.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return a valid access token, refreshing it if needed.
    ///
    /// # Errors
    ///
    /// - `TokenError::HttpError`, `TokenError::AuthenticationRejected`,
    ///   `TokenError::InvalidResponse` - the fetch failed
    /// - `TokenError::AlreadyExpired` - the endpoint returned an expired token
    /// - `TokenError::UnknownClient` - no options exist for this client
    /// - `TokenError::Cancelled` - `cancel` fired before a token was obtained
    #[instrument(skip_all, fields(client = %self.name))]
    pub async fn get_access_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SecretString, TokenError> {
        if let Some(token) = self.fresh_cached_token().await {
            trace!(
                target: "oauth_client.token_manager",
                client = %self.name,
                "Reusing cached access token"
            );
            return Ok(token.value().clone());
        }

        let observed_attempts = self.completed_attempts.load(Ordering::Acquire);

        let mut state = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(
                    target: "oauth_client.token_manager",
                    client = %self.name,
                    "Cancelled while waiting for refresh gate"
                );
                return Err(TokenError::Cancelled);
            }
            guard = self.refresh_gate.lock() => guard,
        };

        // Another caller may have refreshed while we waited for the gate.
        if let Some(token) = self.fresh_cached_token().await {
            trace!(
                target: "oauth_client.token_manager",
                client = %self.name,
                "Reusing cached access token after waiting"
            );
            return Ok(token.value().clone());
        }

        if let Some((attempt, error)) = &state.last_failure {
            if *attempt > observed_attempts {
                debug!(
                    target: "oauth_client.token_manager",
                    client = %self.name,
                    error = %error,
                    "Refresh completed while waiting failed, returning its error"
                );
                return Err(error.clone());
            }
        }

        debug!(
            target: "oauth_client.token_manager",
            client = %self.name,
            "Access token missing or expired, requesting new token"
        );

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(
                    target: "oauth_client.token_manager",
                    client = %self.name,
                    "Cancelled during token refresh"
                );
                return Err(TokenError::Cancelled);
            }
            outcome = self.refresh() => outcome,
        };

        let attempt = self.completed_attempts.load(Ordering::Acquire) + 1;
        let result = match outcome {
            Ok(token) => {
                self.cache.set(&self.name, token.clone()).await;
                state.last_failure = None;
                debug!(
                    target: "oauth_client.token_manager",
                    client = %self.name,
                    expires_at = %token.expires_at(),
                    "Token refreshed successfully"
                );
                Ok(token.value().clone())
            }
            Err(error) => {
                warn!(
                    target: "oauth_client.token_manager",
                    client = %self.name,
                    error = %error,
                    "Token refresh failed"
                );
                state.last_failure = Some((attempt, error.clone()));
                Err(error)
            }
        };
        self.completed_attempts.store(attempt, Ordering::Release);

        result
    }

    /// The cached token if it exists and has not expired.
    async fn fresh_cached_token(&self) -> Option<AccessToken> {
        let now = self.clock.now();
        self.cache
            .get(&self.name)
            .await
            .filter(|token| !token.is_expired(now))
    }

    /// Fetch a token with the current options and validate it. Caller holds the gate.
    async fn refresh(&self) -> Result<AccessToken, TokenError> {
        let options = self.options.current(&self.name)?;
        let token = self.fetcher.request_token(&options).await?;

        if token.is_expired(self.clock.now()) {
            return Err(TokenError::AlreadyExpired);
        }

        Ok(token)
    }
}

#[async_trait]
impl AccessTokenSource for ClientCredentialsTokenManager {
    async fn access_token(&self, cancel: &CancellationToken) -> Result<SecretString, TokenError> {
        self.get_access_token(cancel).await
    }
}

// =============================================================================
// Tests
// =============================================================================
