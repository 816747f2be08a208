//! Wiremock-backed OAuth token endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use oauth_test_utils::MockTokenEndpoint;
//!
//! let endpoint = MockTokenEndpoint::start().await;
//! endpoint.mount_token("T1", Some(60)).await;
//!
//! let options = test_options(&endpoint.token_url());
//! // ... exercise the HTTP fetcher ...
//!
//! let forms = endpoint.token_requests().await;
//! assert_eq!(forms[0]["grant_type"], "client_credentials");
//! ```

use crate::fixtures::token_response_json;
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves tokens on.
pub const TOKEN_PATH: &str = "/oauth/token";

/// A running mock authorization server.
pub struct MockTokenEndpoint {
    server: MockServer,
}

impl MockTokenEndpoint {
    /// Start a server with nothing mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full token endpoint URL.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.server.uri())
    }

    /// Base URL of the server, for mounting non-token routes.
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// The underlying wiremock server.
    #[must_use]
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Answer every token request with `access_token`.
    pub async fn mount_token(&self, access_token: &str, expires_in: Option<i64>) {
        self.mount_response(
            ResponseTemplate::new(200).set_body_json(token_response_json(access_token, expires_in)),
        )
        .await;
    }

    /// Answer the next token request only with `access_token`.
    ///
    /// Mount in the order the responses should be served.
    pub async fn mount_token_once(&self, access_token: &str, expires_in: Option<i64>) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_response_json(access_token, expires_in)),
            )
            .up_to_n_times(1)
            .mount(&self.server)
            .await;
    }

    /// Answer every token request with `access_token` after `delay`.
    pub async fn mount_slow_token(&self, access_token: &str, expires_in: Option<i64>, delay: Duration) {
        self.mount_response(
            ResponseTemplate::new(200)
                .set_body_json(token_response_json(access_token, expires_in))
                .set_delay(delay),
        )
        .await;
    }

    /// Answer every token request with `status` and a JSON error body.
    pub async fn mount_error(&self, status: u16, error: &str) {
        self.mount_response(ResponseTemplate::new(status).set_body_json(serde_json::json!({
            "error": error,
        })))
        .await;
    }

    /// Answer every token request with `template`.
    pub async fn mount_response(&self, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    /// Decoded form bodies of every token request received so far.
    pub async fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == TOKEN_PATH)
            .map(|request| decode_form(&request.body))
            .collect()
    }

    /// Number of token requests received so far.
    pub async fn token_request_count(&self) -> usize {
        self.token_requests().await.len()
    }
}

/// Decode an `application/x-www-form-urlencoded` body.
#[must_use]
pub fn decode_form(body: &[u8]) -> HashMap<String, String> {
    let query = String::from_utf8_lossy(body);
    reqwest::Url::parse(&format!("http://form.invalid/?{query}"))
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default()
}
