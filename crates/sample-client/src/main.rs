//! Sample Client
//!
//! Calls a protected API with a bearer token obtained through the
//! client-credentials grant.
//!
//! # Startup Flow
//!
//! 1. Load client configuration from environment (`OAUTH_CLIENTS`, `OAUTH_<NAME>_*`)
//! 2. Read `SAMPLE_API_BASE_URL`
//! 3. Build the token manager registry (HTTP fetcher, in-memory cache)
//! 4. `GET <base>/api/test` as client `sample-api`
//! 5. Print the response body, pretty-printed when it is JSON
//!
//! Ctrl+C cancels an in-flight token request or API call.

#![warn(clippy::pedantic)]

use anyhow::Context;
use oauth_client::config::Config;
use oauth_client::{AuthorizedClient, HttpTokenFetcher, InMemoryTokenCache, TokenManagerRegistryBuilder};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Client name whose token authorizes the sample call.
const SAMPLE_CLIENT_NAME: &str = "sample-api";

/// Environment variable holding the protected API base URL.
const BASE_URL_VAR: &str = "SAMPLE_API_BASE_URL";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sample_client=info,oauth_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load OAuth client configuration")?;
    let base_url = std::env::var(BASE_URL_VAR)
        .with_context(|| format!("missing required environment variable {BASE_URL_VAR}"))?;

    info!(
        clients = config.clients.len(),
        base_url = %base_url,
        "Starting sample client"
    );

    let registry = TokenManagerRegistryBuilder::new(
        Arc::new(HttpTokenFetcher::new()?),
        Arc::new(InMemoryTokenCache::new()),
    )
    .register_config(config)?
    .build();

    let client = AuthorizedClient::new(reqwest::Client::new(), registry.manager(SAMPLE_CLIENT_NAME)?);

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let url = format!("{}/api/test", base_url.trim_end_matches('/'));
    let body = match call_sample_api(&client, &url, &cancel).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, url = %url, "Sample call failed");
            return Err(e);
        }
    };
    println!("{}", render_body(&body));

    Ok(())
}

/// `GET url` with a bearer token; any non-success status is an error.
async fn call_sample_api(
    client: &AuthorizedClient,
    url: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<String> {
    let response = client.get(url, cancel).await?.error_for_status()?;
    let status = response.status();
    let body = response.text().await?;
    info!(status = %status, "Sample call completed");
    Ok(body)
}

/// Pretty-print JSON bodies; return anything else unchanged.
fn render_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| body.to_string())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Ctrl+C received, cancelling");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}
