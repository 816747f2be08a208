//! Client configuration loaded from environment variables.
//!
//! `OAUTH_CLIENTS` lists the client names, comma-separated. Each client
//! `NAME` is then read from variables prefixed with `OAUTH_<NAME>_`, where the
//! name is uppercased and `-` becomes `_` (client `sample-api` reads
//! `OAUTH_SAMPLE_API_TOKEN_ENDPOINT`).
//!
//! | Suffix | Required | Default |
//! |--------|----------|---------|
//! | `TOKEN_ENDPOINT` | yes | |
//! | `CLIENT_ID` | yes | |
//! | `CLIENT_SECRET` | yes | |
//! | `SCOPE` | no | none |
//! | `AUDIENCE` | no | none |
//! | `REFRESH_BEFORE_EXPIRATION_SECONDS` | no | 30 |
//! | `TIMEOUT_SECONDS` | no | 30 |
//! | `EXTRA_BODY_PARAMS` | no | `key=value,key=value` |
//! | `EXTRA_HEADERS` | no | `Name: value;Name: value` |
//!
//! Sensitive fields are redacted in Debug output.

use crate::error::TokenError;
use crate::options::{
    ClientCredentialsOptions, DEFAULT_REFRESH_BEFORE_EXPIRATION, DEFAULT_TOKEN_REQUEST_TIMEOUT,
};
use crate::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Variable listing the configured client names.
pub const CLIENTS_VAR: &str = "OAUTH_CLIENTS";

/// One configured client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Client name used for registry lookup.
    pub name: String,

    /// Options for the client-credentials request.
    pub options: ClientCredentialsOptions,
}

/// All configured clients, in `OAUTH_CLIENTS` order.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub clients: Vec<ClientConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for TokenError {
    fn from(err: ConfigError) -> Self {
        TokenError::Configuration(err.to_string())
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// cannot be parsed.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let names = vars
            .get(CLIENTS_VAR)
            .ok_or_else(|| ConfigError::MissingEnvVar(CLIENTS_VAR.to_string()))?;

        let mut clients: Vec<ClientConfig> = Vec::new();
        for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if clients.iter().any(|c| c.name == name) {
                return Err(ConfigError::InvalidValue(format!(
                    "{CLIENTS_VAR} lists {name} more than once"
                )));
            }
            let prefix = var_prefix(name);
            if let Some(other) = clients.iter().find(|c| var_prefix(&c.name) == prefix) {
                return Err(ConfigError::InvalidValue(format!(
                    "clients {} and {name} both read variables prefixed {prefix}",
                    other.name
                )));
            }
            clients.push(ClientConfig {
                name: name.to_string(),
                options: client_options(vars, name)?,
            });
        }

        if clients.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "{CLIENTS_VAR} must name at least one client"
            )));
        }

        Ok(Config { clients })
    }

    /// The configured client called `name`.
    #[must_use]
    pub fn client(&self, name: &str) -> Option<&ClientConfig> {
        self.clients.iter().find(|c| c.name == name)
    }
}

/// `OAUTH_<NAME>_` prefix for a client name.
fn var_prefix(name: &str) -> String {
    format!("OAUTH_{}_", name.to_ascii_uppercase().replace('-', "_"))
}

fn client_options(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<ClientCredentialsOptions, ConfigError> {
    let prefix = var_prefix(name);
    let optional = |suffix: &str| optional_var(vars, &prefix, suffix);

    let mut options = ClientCredentialsOptions::new(
        required_var(vars, &prefix, "TOKEN_ENDPOINT")?,
        required_var(vars, &prefix, "CLIENT_ID")?,
        SecretString::from(required_var(vars, &prefix, "CLIENT_SECRET")?),
    );

    if let Some(scope) = optional("SCOPE") {
        options = options.with_scope(scope.clone());
    }
    if let Some(audience) = optional("AUDIENCE") {
        options = options.with_audience(audience.clone());
    }

    options.refresh_before_expiration = match optional("REFRESH_BEFORE_EXPIRATION_SECONDS") {
        Some(raw) => parse_seconds(&prefix, "REFRESH_BEFORE_EXPIRATION_SECONDS", raw)?,
        None => DEFAULT_REFRESH_BEFORE_EXPIRATION,
    };
    options.timeout = match optional("TIMEOUT_SECONDS") {
        Some(raw) => parse_seconds(&prefix, "TIMEOUT_SECONDS", raw)?,
        None => DEFAULT_TOKEN_REQUEST_TIMEOUT,
    };

    if let Some(raw) = optional("EXTRA_BODY_PARAMS") {
        for (key, value) in parse_pairs(raw, ',', '=')
            .map_err(|entry| invalid(&prefix, "EXTRA_BODY_PARAMS", &entry))?
        {
            options = options.with_body_parameter(key, value);
        }
    }
    if let Some(raw) = optional("EXTRA_HEADERS") {
        for (header, value) in parse_pairs(raw, ';', ':')
            .map_err(|entry| invalid(&prefix, "EXTRA_HEADERS", &entry))?
        {
            options = options.with_header(&header, value);
        }
    }

    Ok(options)
}

fn required_var(
    vars: &HashMap<String, String>,
    prefix: &str,
    suffix: &str,
) -> Result<String, ConfigError> {
    let key = format!("{prefix}{suffix}");
    vars.get(&key)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or(ConfigError::MissingEnvVar(key))
}

/// Blank values count as unset.
fn optional_var<'a>(
    vars: &'a HashMap<String, String>,
    prefix: &str,
    suffix: &str,
) -> Option<&'a String> {
    vars.get(&format!("{prefix}{suffix}"))
        .filter(|v| !v.trim().is_empty())
}

fn parse_seconds(prefix: &str, suffix: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| {
            ConfigError::InvalidValue(format!(
                "{prefix}{suffix} must be a whole number of seconds, got '{raw}': {e}"
            ))
        })
}

/// Split `a=1,b=2` style lists. Returns the offending entry on failure.
fn parse_pairs(raw: &str, separator: char, delimiter: char) -> Result<Vec<(String, String)>, String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(delimiter) {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(entry.to_string()),
        })
        .collect()
}

fn invalid(prefix: &str, suffix: &str, entry: &str) -> ConfigError {
    ConfigError::InvalidValue(format!("{prefix}{suffix} has malformed entry '{entry}'"))
}
