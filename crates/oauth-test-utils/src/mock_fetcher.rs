//! Scripted token fetcher.
//!
//! Replays queued results in order, then falls back to issuing
//! `token-<n>` with a default lifetime. Expiry is computed from the clock and
//! the options' refresh margin exactly like the HTTP fetcher does, so expiry
//! scenarios behave the same as against a real endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth_test_utils::MockTokenFetcher;
//!
//! let fetcher = MockTokenFetcher::new()
//!     .with_token("T1", Some(60))
//!     .with_error(TokenError::HttpError("boom".into()))
//!     .with_delay(Duration::from_millis(50));
//!
//! fetcher.hold();
//! // ... spawn callers, they all block inside the fetch ...
//! fetcher.wait_for_calls(1).await;
//! fetcher.release();
//! ```

use async_trait::async_trait;
use oauth_client::fetcher::compute_expires_at;
use oauth_client::secret::ExposeSecret;
use oauth_client::{AccessToken, ClientCredentialsOptions, Clock, SystemClock, TokenError, TokenFetcher};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Lifetime used once the script is exhausted.
pub const DEFAULT_MOCK_EXPIRES_IN: i64 = 3600;

/// One scripted fetch result.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Issue `value` with the given `expires_in` seconds.
    Token {
        value: String,
        expires_in: Option<i64>,
    },
    /// Fail with this error.
    Error(TokenError),
}

/// What the fetcher was asked for on one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

struct Inner {
    script: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicU32,
    delay: Mutex<Option<Duration>>,
    open: watch::Sender<bool>,
    clock: Mutex<Arc<dyn Clock>>,
}

/// Token fetcher driven by a script. Clones share state.
#[derive(Clone)]
pub struct MockTokenFetcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for MockTokenFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTokenFetcher")
            .field("inner", &self.inner)
            .finish()
    }
}

impl Default for MockTokenFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTokenFetcher {
    /// Create a fetcher with an empty script, no delay and the system clock.
    #[must_use]
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                script: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
                delay: Mutex::new(None),
                open,
                clock: Mutex::new(Arc::new(SystemClock)),
            }),
        }
    }

    /// Queue a successful response.
    #[must_use]
    pub fn with_token(self, value: &str, expires_in: Option<i64>) -> Self {
        self.push(MockResponse::Token {
            value: value.to_string(),
            expires_in,
        });
        self
    }

    /// Queue a failure.
    #[must_use]
    pub fn with_error(self, error: TokenError) -> Self {
        self.push(MockResponse::Error(error));
        self
    }

    /// Sleep for `delay` inside every fetch.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Compute expiry from `clock`.
    #[must_use]
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        *self.inner.clock.lock().unwrap() = Arc::new(clock);
        self
    }

    /// Append a response to the script.
    pub fn push(&self, response: MockResponse) {
        self.inner.script.lock().unwrap().push_back(response);
    }

    /// Block every fetch (after it is counted) until [`Self::release`].
    pub fn hold(&self) {
        self.inner.open.send_replace(false);
    }

    /// Let held fetches continue.
    pub fn release(&self) {
        self.inner.open.send_replace(true);
    }

    /// Number of fetches started so far.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Options seen by each fetch, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    /// Wait until at least `n` fetches have started. Panics after 5 seconds.
    pub async fn wait_for_calls(&self, n: u32) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while self.calls() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} fetch calls, saw {}",
                self.calls()
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[async_trait]
impl TokenFetcher for MockTokenFetcher {
    async fn request_token(
        &self,
        options: &ClientCredentialsOptions,
    ) -> Result<AccessToken, TokenError> {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.requests.lock().unwrap().push(RecordedRequest {
            token_endpoint: options.token_endpoint.clone(),
            client_id: options.client_id.clone(),
            client_secret: options.client_secret.expose_secret().to_string(),
            scope: options.scope.clone(),
        });

        let mut open = self.inner.open.subscribe();
        let _ = open.wait_for(|open| *open).await;

        let delay = *self.inner.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.inner.script.lock().unwrap().pop_front();
        let (value, expires_in) = match response {
            Some(MockResponse::Token { value, expires_in }) => (value, expires_in),
            Some(MockResponse::Error(error)) => return Err(error),
            None => (format!("token-{call}"), Some(DEFAULT_MOCK_EXPIRES_IN)),
        };

        let now = self.inner.clock.lock().unwrap().now();
        let expires_at = compute_expires_at(now, expires_in, options.refresh_before_expiration);
        AccessToken::new(value, expires_at)
    }
}
