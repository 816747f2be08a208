//! Standard test data for token manager tests.

use chrono::{DateTime, TimeZone, Utc};
use oauth_client::secret::SecretString;
use oauth_client::{ClientCredentialsOptions, OptionsProvider, TokenError};
use std::sync::Arc;
use std::time::Duration;

/// Client name used by single-client tests.
pub const TEST_CLIENT_NAME: &str = "sample-api";

/// Client id in [`test_options`].
pub const TEST_CLIENT_ID: &str = "c1";

/// Client secret in [`test_options`].
pub const TEST_CLIENT_SECRET: &str = "s1";

/// Scope in [`test_options`].
pub const TEST_SCOPE: &str = "read";

/// Refresh margin in [`test_options`], in seconds.
pub const TEST_REFRESH_MARGIN_SECS: u64 = 10;

/// Fixed reference instant (2023-11-14T22:13:20Z) used as t=0.
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// Options with client `c1`/`s1`, scope `read` and a 10 second margin.
#[must_use]
pub fn test_options(token_endpoint: &str) -> ClientCredentialsOptions {
    ClientCredentialsOptions::new(
        token_endpoint,
        TEST_CLIENT_ID,
        SecretString::from(TEST_CLIENT_SECRET),
    )
    .with_scope(TEST_SCOPE)
    .with_refresh_before_expiration(Duration::from_secs(TEST_REFRESH_MARGIN_SECS))
}

/// Options provider that always returns `options`, whatever the client name.
#[must_use]
pub fn static_options(options: ClientCredentialsOptions) -> Arc<dyn OptionsProvider> {
    Arc::new(
        move |_: &str| -> Result<ClientCredentialsOptions, TokenError> { Ok(options.clone()) },
    )
}

/// Successful token endpoint JSON body.
#[must_use]
pub fn token_response_json(access_token: &str, expires_in: Option<i64>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
    });
    if let Some(expires_in) = expires_in {
        body["expires_in"] = serde_json::json!(expires_in);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_json() {
        let body = token_response_json("T1", Some(60));
        assert_eq!(body["access_token"], "T1");
        assert_eq!(body["expires_in"], 60);

        let body = token_response_json("T1", None);
        assert!(body.get("expires_in").is_none());
    }

    #[test]
    fn test_options_are_valid() {
        assert!(test_options("https://auth.example.com/token").validate().is_ok());
    }
}
