//! OAuth 2.0 client-credentials token management.
//!
//! Obtains access tokens with the client-credentials grant, caches them per
//! named client, refreshes them at most once at a time per client, and
//! injects them as bearer `Authorization` headers on outgoing requests.

#![warn(clippy::pedantic)]

/// Module for the token management error type
pub mod error;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for the injectable clock
pub mod clock;

/// Module for the access token entity
pub mod token;

/// Module for per-client options and live option lookup
pub mod options;

/// Module for the token cache contract and in-memory cache
pub mod cache;

/// Module for the token fetcher contract and HTTP fetcher
pub mod fetcher;

/// Module for the per-client token manager
pub mod token_manager;

/// Module for the client name to manager registry
pub mod registry;

/// Module for bearer token injection into outgoing requests
pub mod interceptor;

/// Module for environment-based configuration
pub mod config;

pub use cache::{InMemoryTokenCache, TokenCache};
pub use clock::{Clock, SystemClock};
pub use error::TokenError;
pub use fetcher::{HttpTokenFetcher, TokenFetcher};
pub use interceptor::{AuthorizedClient, BearerTokenInjector};
pub use options::{ClientCredentialsOptions, OptionsMonitor, OptionsProvider};
pub use registry::{TokenManagerRegistry, TokenManagerRegistryBuilder};
pub use token::AccessToken;
pub use token_manager::{AccessTokenSource, ClientCredentialsTokenManager};
