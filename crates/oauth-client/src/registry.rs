//! Client name to token manager registry.
//!
//! Clients are registered once, at configuration time, through
//! [`TokenManagerRegistryBuilder`]. After [`TokenManagerRegistryBuilder::build`]
//! the set of names is fixed; only the options behind each name can change,
//! via [`TokenManagerRegistry::update_options`].
//!
//! All managers built by one registry share the same fetcher, cache and
//! clock. Each manager has its own refresh gate, so clients never wait on
//! each other.

use crate::cache::TokenCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::TokenError;
use crate::fetcher::TokenFetcher;
use crate::options::{ClientCredentialsOptions, OptionsMonitor, OptionsProvider};
use crate::token_manager::ClientCredentialsTokenManager;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Collects client registrations and builds a [`TokenManagerRegistry`].
pub struct TokenManagerRegistryBuilder {
    fetcher: Arc<dyn TokenFetcher>,
    cache: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
    options: OptionsMonitor,
}

impl TokenManagerRegistryBuilder {
    /// Start a registry whose managers use `fetcher` and `cache`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn TokenFetcher>, cache: Arc<dyn TokenCache>) -> Self {
        Self {
            fetcher,
            cache,
            clock: Arc::new(SystemClock),
            options: OptionsMonitor::new(),
        }
    }

    /// Use `clock` for every manager's expiry checks.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register a client.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Configuration` if the name is empty or already
    /// registered, or the options fail validation.
    pub fn register(
        mut self,
        client_name: &str,
        options: ClientCredentialsOptions,
    ) -> Result<Self, TokenError> {
        self.options.insert(client_name, options)?;
        debug!(
            target: "oauth_client.registry",
            client = %client_name,
            "Client registered"
        );
        Ok(self)
    }

    /// Register every client found in `config`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register`] for each client.
    pub fn register_config(self, config: Config) -> Result<Self, TokenError> {
        config
            .clients
            .into_iter()
            .try_fold(self, |builder, client| {
                builder.register(&client.name, client.options)
            })
    }

    /// Create one manager per registered client.
    #[must_use]
    pub fn build(self) -> TokenManagerRegistry {
        let options = Arc::new(self.options);
        let provider: Arc<dyn OptionsProvider> = Arc::clone(&options) as Arc<dyn OptionsProvider>;

        let managers: HashMap<String, Arc<ClientCredentialsTokenManager>> = options
            .client_names()
            .map(|name| {
                // Names were checked by `OptionsMonitor::insert`
                let manager = ClientCredentialsTokenManager::with_checked_name(
                    name.to_string(),
                    Arc::clone(&provider),
                    Arc::clone(&self.fetcher),
                    Arc::clone(&self.cache),
                )
                .with_clock(Arc::clone(&self.clock));
                (name.to_string(), Arc::new(manager))
            })
            .collect();

        info!(
            target: "oauth_client.registry",
            clients = managers.len(),
            "Token manager registry built"
        );

        TokenManagerRegistry { options, managers }
    }
}

impl fmt::Debug for TokenManagerRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManagerRegistryBuilder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Fixed set of named token managers with live options.
pub struct TokenManagerRegistry {
    options: Arc<OptionsMonitor>,
    managers: HashMap<String, Arc<ClientCredentialsTokenManager>>,
}

impl TokenManagerRegistry {
    /// The manager for `client_name`.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::UnknownClient` if the name was never registered.
    pub fn manager(
        &self,
        client_name: &str,
    ) -> Result<Arc<ClientCredentialsTokenManager>, TokenError> {
        self.managers
            .get(client_name)
            .cloned()
            .ok_or_else(|| TokenError::UnknownClient(client_name.to_string()))
    }

    /// Replace the options of a registered client.
    ///
    /// Takes effect on the client's next refresh.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::UnknownClient` or `TokenError::Configuration`.
    pub fn update_options(
        &self,
        client_name: &str,
        options: ClientCredentialsOptions,
    ) -> Result<(), TokenError> {
        self.options.update(client_name, options)
    }

    /// Current options of a registered client.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::UnknownClient` if the name was never registered.
    pub fn options(&self, client_name: &str) -> Result<ClientCredentialsOptions, TokenError> {
        self.options.current(client_name)
    }

    /// Registered client names, sorted.
    #[must_use]
    pub fn client_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.managers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for TokenManagerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManagerRegistry")
            .field("clients", &self.client_names())
            .finish()
    }
}
