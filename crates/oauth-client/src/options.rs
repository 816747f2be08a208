//! Per-client options for the client-credentials grant.
//!
//! [`ClientCredentialsOptions`] describes one downstream client: where to get
//! tokens, which credentials to present, and how early to refresh. Options
//! are looked up through an [`OptionsProvider`] on every refresh so that a
//! configuration change is picked up by the next token request without
//! rebuilding the manager. [`OptionsMonitor`] is the provider used by the
//! registry; it keeps one `tokio::sync::watch` channel per client.

use crate::error::TokenError;
use crate::secret::{ExposeSecret, SecretString};
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Default margin subtracted from the reported token lifetime.
pub const DEFAULT_REFRESH_BEFORE_EXPIRATION: Duration = Duration::from_secs(30);

/// Default timeout for a single token request.
pub const DEFAULT_TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration required to request a token with the client-credentials grant.
#[derive(Clone, Deserialize)]
pub struct ClientCredentialsOptions {
    /// Token endpoint URL. **Should use HTTPS in production.**
    pub token_endpoint: String,

    /// Client identifier registered with the authorization server.
    pub client_id: String,

    /// Client secret registered with the authorization server.
    pub client_secret: SecretString,

    /// Optional scope requested from the token endpoint.
    #[serde(default)]
    pub scope: Option<String>,

    /// Optional audience, for servers that support it.
    #[serde(default)]
    pub audience: Option<String>,

    /// Extra form fields sent to the token endpoint.
    ///
    /// These may override `scope` and `audience` but never `grant_type`,
    /// `client_id` or `client_secret`.
    #[serde(default)]
    pub additional_body_parameters: BTreeMap<String, String>,

    /// Extra headers sent to the token endpoint. Keys are stored lowercase.
    #[serde(default, deserialize_with = "deserialize_header_map")]
    pub additional_headers: BTreeMap<String, String>,

    /// Margin subtracted from the reported lifetime when computing expiry.
    #[serde(
        default = "default_refresh_before_expiration",
        rename = "refresh_before_expiration_seconds",
        deserialize_with = "deserialize_seconds"
    )]
    pub refresh_before_expiration: Duration,

    /// Timeout applied to the token request.
    #[serde(
        default = "default_timeout",
        rename = "timeout_seconds",
        deserialize_with = "deserialize_seconds"
    )]
    pub timeout: Duration,
}

impl fmt::Debug for ClientCredentialsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsOptions")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("audience", &self.audience)
            .field(
                "additional_body_parameters",
                &self.additional_body_parameters.keys().collect::<Vec<_>>(),
            )
            .field(
                "additional_headers",
                &self.additional_headers.keys().collect::<Vec<_>>(),
            )
            .field("refresh_before_expiration", &self.refresh_before_expiration)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientCredentialsOptions {
    /// Create options with default margin and timeout.
    #[must_use]
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
    ) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret,
            scope: None,
            audience: None,
            additional_body_parameters: BTreeMap::new(),
            additional_headers: BTreeMap::new(),
            refresh_before_expiration: DEFAULT_REFRESH_BEFORE_EXPIRATION,
            timeout: DEFAULT_TOKEN_REQUEST_TIMEOUT,
        }
    }

    /// Set the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Set the audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Add an extra form field. A repeated key replaces the earlier value.
    #[must_use]
    pub fn with_body_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_body_parameters
            .insert(key.into(), value.into());
        self
    }

    /// Add an extra header. Names are case-insensitive; the last one wins.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.additional_headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Set the refresh margin.
    #[must_use]
    pub fn with_refresh_before_expiration(mut self, margin: Duration) -> Self {
        self.refresh_before_expiration = margin;
        self
    }

    /// Set the token request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the required fields and the extra headers.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the endpoint is missing or not
    /// an http(s) URL, the client id or secret is empty, or an extra header
    /// is not a valid HTTP header.
    pub fn validate(&self) -> Result<(), TokenError> {
        if self.token_endpoint.trim().is_empty() {
            return Err(TokenError::Configuration(
                "token endpoint is required".into(),
            ));
        }
        let url = reqwest::Url::parse(&self.token_endpoint).map_err(|e| {
            TokenError::Configuration(format!("token endpoint is not a valid URL: {e}"))
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(TokenError::Configuration(format!(
                "token endpoint must use http or https, got {}",
                url.scheme()
            )));
        }
        if self.client_id.trim().is_empty() {
            return Err(TokenError::Configuration("client id is required".into()));
        }
        if self.client_secret.expose_secret().trim().is_empty() {
            return Err(TokenError::Configuration(
                "client secret is required".into(),
            ));
        }
        for (name, value) in &self.additional_headers {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                TokenError::Configuration(format!("invalid header name: {name}"))
            })?;
            HeaderValue::from_str(value).map_err(|_| {
                TokenError::Configuration(format!("invalid value for header {name}"))
            })?;
        }
        Ok(())
    }
}

fn default_refresh_before_expiration() -> Duration {
    DEFAULT_REFRESH_BEFORE_EXPIRATION
}

fn default_timeout() -> Duration {
    DEFAULT_TOKEN_REQUEST_TIMEOUT
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn deserialize_header_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect())
}

// =============================================================================
// Options lookup
// =============================================================================

/// Returns the current options for a client name.
///
/// Called on every refresh; implementations must not hand out a snapshot
/// captured before the call.
pub trait OptionsProvider: Send + Sync {
    /// Current options for `client_name`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::UnknownClient` if no options exist for the name.
    fn current(&self, client_name: &str) -> Result<ClientCredentialsOptions, TokenError>;
}

impl<F> OptionsProvider for F
where
    F: Fn(&str) -> Result<ClientCredentialsOptions, TokenError> + Send + Sync,
{
    fn current(&self, client_name: &str) -> Result<ClientCredentialsOptions, TokenError> {
        self(client_name)
    }
}

/// Live, per-client options store.
///
/// The set of client names is fixed once configuration is complete; the
/// options behind each name can be replaced at any time with
/// [`OptionsMonitor::update`].
#[derive(Default)]
pub struct OptionsMonitor {
    clients: HashMap<String, watch::Sender<ClientCredentialsOptions>>,
}

impl OptionsMonitor {
    /// Create an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client at configuration time.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the name is empty or already
    /// present, or the options are invalid.
    pub fn insert(
        &mut self,
        client_name: &str,
        options: ClientCredentialsOptions,
    ) -> Result<(), TokenError> {
        if client_name.trim().is_empty() {
            return Err(TokenError::Configuration(
                "client name must not be empty".into(),
            ));
        }
        if self.clients.contains_key(client_name) {
            return Err(TokenError::Configuration(format!(
                "client {client_name} is already registered"
            )));
        }
        options.validate()?;
        let (sender, _receiver) = watch::channel(options);
        self.clients.insert(client_name.to_string(), sender);
        Ok(())
    }

    /// Replace the options of an existing client.
    ///
    /// The next refresh for that client uses the new options; a token that
    /// is already cached stays in use until it expires.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::UnknownClient` for an unregistered name or
    /// `TokenError::Configuration` for invalid options.
    pub fn update(
        &self,
        client_name: &str,
        options: ClientCredentialsOptions,
    ) -> Result<(), TokenError> {
        let sender = self
            .clients
            .get(client_name)
            .ok_or_else(|| TokenError::UnknownClient(client_name.to_string()))?;
        options.validate()?;
        sender.send_replace(options);
        debug!(
            target: "oauth_client.options",
            client = %client_name,
            "Client options updated"
        );
        Ok(())
    }

    /// Registered client names, in no particular order.
    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Whether `client_name` is registered.
    #[must_use]
    pub fn contains(&self, client_name: &str) -> bool {
        self.clients.contains_key(client_name)
    }
}

impl fmt::Debug for OptionsMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionsMonitor")
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OptionsProvider for OptionsMonitor {
    fn current(&self, client_name: &str) -> Result<ClientCredentialsOptions, TokenError> {
        self.clients
            .get(client_name)
            .map(|sender| sender.borrow().clone())
            .ok_or_else(|| TokenError::UnknownClient(client_name.to_string()))
    }
}
