//! End-to-end tests: environment config, registry, HTTP fetcher and the
//! authorized client against a mock authorization server.
//!
//! Covers:
//! - Bearer token injected on downstream calls, one token request for many calls
//! - Token request form contents built from configuration
//! - Credential rejection surfaces before any downstream call
//! - Single token request under concurrent load over real HTTP
//! - Live option updates reaching the token endpoint

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use futures::future::join_all;
use oauth_client::config::Config;
use oauth_client::interceptor::AuthorizedRequestError;
use oauth_client::secret::ExposeSecret;
use oauth_client::{
    AuthorizedClient, HttpTokenFetcher, InMemoryTokenCache, TokenCache, TokenError, TokenManagerRegistry,
    TokenManagerRegistryBuilder,
};
use oauth_test_utils::{test_options, MockTokenEndpoint, TEST_CLIENT_NAME};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn env_vars(token_url: &str) -> HashMap<String, String> {
    HashMap::from([
        ("OAUTH_CLIENTS".to_string(), TEST_CLIENT_NAME.to_string()),
        (
            "OAUTH_SAMPLE_API_TOKEN_ENDPOINT".to_string(),
            token_url.to_string(),
        ),
        ("OAUTH_SAMPLE_API_CLIENT_ID".to_string(), "c1".to_string()),
        ("OAUTH_SAMPLE_API_CLIENT_SECRET".to_string(), "s1".to_string()),
        ("OAUTH_SAMPLE_API_SCOPE".to_string(), "read".to_string()),
        (
            "OAUTH_SAMPLE_API_EXTRA_BODY_PARAMS".to_string(),
            "resource=https://api.example.com,client_id=evil".to_string(),
        ),
        (
            "OAUTH_SAMPLE_API_EXTRA_HEADERS".to_string(),
            "X-Tenant: t1".to_string(),
        ),
    ])
}

fn registry_from_env(token_url: &str) -> Result<TokenManagerRegistry> {
    let config = Config::from_vars(&env_vars(token_url))?;
    let registry = TokenManagerRegistryBuilder::new(
        Arc::new(HttpTokenFetcher::new()?),
        Arc::new(InMemoryTokenCache::new()),
    )
    .register_config(config)?
    .build();
    Ok(registry)
}

#[tokio::test]
async fn test_authorized_calls_share_one_token() -> Result<()> {
    let endpoint = MockTokenEndpoint::start().await;
    endpoint.mount_token("T1", Some(3600)).await;
    Mock::given(method("GET"))
        .and(path("/api/test"))
        .and(header("authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok"
        })))
        .expect(5)
        .mount(endpoint.server())
        .await;

    let registry = registry_from_env(&endpoint.token_url())?;
    let client = AuthorizedClient::new(reqwest::Client::new(), registry.manager(TEST_CLIENT_NAME)?);
    let cancel = CancellationToken::new();

    for _ in 0..5 {
        let response = client
            .get(format!("{}/api/test", endpoint.uri()), &cancel)
            .await?;
        assert_eq!(response.status(), 200);
    }

    assert_eq!(endpoint.token_request_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_token_request_form_from_config() -> Result<()> {
    let endpoint = MockTokenEndpoint::start().await;
    endpoint.mount_token("T1", Some(3600)).await;

    let registry = registry_from_env(&endpoint.token_url())?;
    registry
        .manager(TEST_CLIENT_NAME)?
        .get_access_token(&CancellationToken::new())
        .await?;

    let forms = endpoint.token_requests().await;
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    assert_eq!(form["grant_type"], "client_credentials");
    assert_eq!(form["client_id"], "c1");
    assert_eq!(form["client_secret"], "s1");
    assert_eq!(form["scope"], "read");
    assert_eq!(form["resource"], "https://api.example.com");

    let requests = endpoint.server().received_requests().await.unwrap();
    assert_eq!(requests[0].headers.get("x-tenant").unwrap(), "t1");
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials_skip_downstream_call() -> Result<()> {
    let endpoint = MockTokenEndpoint::start().await;
    endpoint.mount_error(401, "invalid_client").await;
    Mock::given(method("GET"))
        .and(path("/api/test"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(endpoint.server())
        .await;

    let registry = registry_from_env(&endpoint.token_url())?;
    let client = AuthorizedClient::new(reqwest::Client::new(), registry.manager(TEST_CLIENT_NAME)?);

    let err = client
        .get(
            format!("{}/api/test", endpoint.uri()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AuthorizedRequestError::Token(TokenError::AuthenticationRejected(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_callers_over_http_fetch_once() -> Result<()> {
    let endpoint = MockTokenEndpoint::start().await;
    endpoint
        .mount_slow_token("T1", Some(3600), Duration::from_millis(200))
        .await;

    let registry = registry_from_env(&endpoint.token_url())?;
    let manager = registry.manager(TEST_CLIENT_NAME)?;

    let calls = (0..50).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .get_access_token(&CancellationToken::new())
                .await
                .map(|token| token.expose_secret().to_string())
        })
    });
    for result in join_all(calls).await {
        assert_eq!(result??, "T1");
    }

    assert_eq!(endpoint.token_request_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_updated_options_reach_token_endpoint() -> Result<()> {
    let endpoint = MockTokenEndpoint::start().await;
    endpoint.mount_token_once("T1", Some(3600)).await;
    endpoint.mount_token_once("T2", Some(3600)).await;

    let fetcher = Arc::new(HttpTokenFetcher::new()?);
    let cache = Arc::new(InMemoryTokenCache::new());
    let registry = TokenManagerRegistryBuilder::new(fetcher, Arc::clone(&cache) as Arc<dyn TokenCache>)
        .register(TEST_CLIENT_NAME, test_options(&endpoint.token_url()))?
        .build();
    let manager = registry.manager(TEST_CLIENT_NAME)?;
    let cancel = CancellationToken::new();

    manager.get_access_token(&cancel).await?;
    registry.update_options(
        TEST_CLIENT_NAME,
        test_options(&endpoint.token_url()).with_scope("write"),
    )?;
    cache.remove(TEST_CLIENT_NAME).await;
    let token = manager.get_access_token(&cancel).await?;
    assert_eq!(token.expose_secret(), "T2");

    let forms = endpoint.token_requests().await;
    assert_eq!(forms.len(), 2);
    assert_eq!(forms[0]["scope"], "read");
    assert_eq!(forms[1]["scope"], "write");
    Ok(())
}
