//! Bearer token injection for outgoing HTTP requests.
//!
//! [`BearerTokenInjector`] adds `Authorization: Bearer <token>` to a
//! `reqwest::Request` that does not already carry an `Authorization` header.
//! [`AuthorizedClient`] pairs it with a `reqwest::Client` so callers can send
//! requests without touching tokens at all.

use crate::error::TokenError;
use crate::secret::bearer_header_value;
use crate::token_manager::AccessTokenSource;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{IntoUrl, Request, Response};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Errors from sending a request through [`AuthorizedClient`].
#[derive(Debug, Error)]
pub enum AuthorizedRequestError {
    /// No access token could be obtained.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The downstream request itself failed.
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Adds a bearer token to requests that lack an `Authorization` header.
#[derive(Clone)]
pub struct BearerTokenInjector {
    source: Arc<dyn AccessTokenSource>,
}

impl BearerTokenInjector {
    #[must_use]
    pub fn new(source: Arc<dyn AccessTokenSource>) -> Self {
        Self { source }
    }

    /// Set `Authorization: Bearer <token>` unless the request already has an
    /// `Authorization` header.
    ///
    /// # Errors
    ///
    /// Returns the token source's error; the request is left unchanged.
    #[instrument(skip_all)]
    pub async fn authorize(
        &self,
        request: &mut Request,
        cancel: &CancellationToken,
    ) -> Result<(), TokenError> {
        if request.headers().contains_key(AUTHORIZATION) {
            trace!(
                target: "oauth_client.interceptor",
                "Request already has an Authorization header, leaving it untouched"
            );
            return Ok(());
        }

        let token = self.source.access_token(cancel).await?;
        let mut value = HeaderValue::from_str(&bearer_header_value(&token)).map_err(|_| {
            TokenError::InvalidResponse("access token is not a valid header value".into())
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        Ok(())
    }
}

impl fmt::Debug for BearerTokenInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenInjector").finish_non_exhaustive()
    }
}

/// HTTP client that authorizes every request with a bearer token.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    http_client: reqwest::Client,
    injector: BearerTokenInjector,
}

impl AuthorizedClient {
    /// Wrap `http_client`, taking tokens from `source`.
    #[must_use]
    pub fn new(http_client: reqwest::Client, source: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            http_client,
            injector: BearerTokenInjector::new(source),
        }
    }

    /// The wrapped client, for building requests.
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    /// Authorize and send `request`.
    ///
    /// # Errors
    ///
    /// Returns `AuthorizedRequestError::Token` if no token could be obtained
    /// or `cancel` fired, and `AuthorizedRequestError::Http` if sending failed.
    #[instrument(skip_all, fields(method = %request.method(), url = %request.url()))]
    pub async fn execute(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, AuthorizedRequestError> {
        self.injector.authorize(&mut request, cancel).await?;

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TokenError::Cancelled.into()),
            response = self.http_client.execute(request) => response?,
        };

        debug!(
            target: "oauth_client.interceptor",
            status = %response.status(),
            "Authorized request completed"
        );

        Ok(response)
    }

    /// Send an authorized `GET` to `url`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::execute`]; an invalid URL is reported as
    /// `AuthorizedRequestError::Http`.
    pub async fn get(
        &self,
        url: impl IntoUrl,
        cancel: &CancellationToken,
    ) -> Result<Response, AuthorizedRequestError> {
        let request = self.http_client.get(url).build()?;
        self.execute(request, cancel).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::secret::SecretString;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedSource {
        result: Result<&'static str, TokenError>,
        calls: AtomicU32,
    }

    impl FixedSource {
        fn ok(value: &'static str) -> Arc<Self> {
            Arc::new(Self {
                result: Ok(value),
                calls: AtomicU32::new(0),
            })
        }

        fn failing(error: TokenError) -> Arc<Self> {
            Arc::new(Self {
                result: Err(error),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl AccessTokenSource for FixedSource {
        async fn access_token(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<SecretString, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map(SecretString::from)
        }
    }

    fn request(url: &str) -> Request {
        reqwest::Client::new().get(url).build().unwrap()
    }

    #[tokio::test]
    async fn test_authorize_sets_sensitive_bearer_header() {
        let source = FixedSource::ok("T1");
        let injector = BearerTokenInjector::new(Arc::clone(&source) as Arc<dyn AccessTokenSource>);
        let mut req = request("https://api.example.com/api/test");

        injector
            .authorize(&mut req, &CancellationToken::new())
            .await
            .unwrap();

        let value = req.headers().get(AUTHORIZATION).unwrap();
        assert_eq!(value, "Bearer T1");
        assert!(value.is_sensitive());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_authorize_keeps_existing_header() {
        let source = FixedSource::ok("T1");
        let injector = BearerTokenInjector::new(Arc::clone(&source) as Arc<dyn AccessTokenSource>);
        let mut req = request("https://api.example.com/api/test");
        req.headers_mut()
            .insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));

        injector
            .authorize(&mut req, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(req.headers().get(AUTHORIZATION).unwrap(), "Basic abc");
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_authorize_failure_leaves_request_unchanged() {
        let injector = BearerTokenInjector::new(FixedSource::failing(TokenError::AlreadyExpired));
        let mut req = request("https://api.example.com/api/test");

        let err = injector
            .authorize(&mut req, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, TokenError::AlreadyExpired);
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_authorized_client_get() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/test"))
            .and(header("authorization", "Bearer T1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "ok"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = AuthorizedClient::new(reqwest::Client::new(), FixedSource::ok("T1"));
        let response = client
            .get(
                format!("{}/api/test", mock_server.uri()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["message"], "ok");
    }

    #[tokio::test]
    async fn test_authorized_client_token_failure_skips_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let client = AuthorizedClient::new(
            reqwest::Client::new(),
            FixedSource::failing(TokenError::HttpError("connection refused".into())),
        );
        let err = client
            .get(
                format!("{}/api/test", mock_server.uri()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthorizedRequestError::Token(TokenError::HttpError(_))
        ));
    }

    #[tokio::test]
    async fn test_authorized_client_invalid_url() {
        let client = AuthorizedClient::new(reqwest::Client::new(), FixedSource::ok("T1"));
        let err = client
            .get("not a url", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthorizedRequestError::Http(_)));
    }

    #[tokio::test]
    async fn test_authorized_client_cancelled_during_send() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let client = AuthorizedClient::new(reqwest::Client::new(), FixedSource::ok("T1"));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = client
            .get(format!("{}/api/test", mock_server.uri()), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AuthorizedRequestError::Token(TokenError::Cancelled)
        ));
    }
}
