//! # OAuth Test Utilities
//!
//! Shared test utilities for the `oauth-client` crate.
//!
//! ## Modules
//!
//! - `mock_clock` - Settable clock for expiry scenarios
//! - `mock_fetcher` - Scripted token fetcher with call counting, delays and a hold switch
//! - `token_endpoint` - Wiremock-backed token endpoint for HTTP tests
//! - `fixtures` - Standard options, client names and instants
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oauth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let clock = MockClock::at_offset(0);
//!     let fetcher = MockTokenFetcher::new()
//!         .with_clock(clock.clone())
//!         .with_token("T1", Some(60));
//!
//!     let manager = ClientCredentialsTokenManager::new(
//!         TEST_CLIENT_NAME,
//!         static_options(test_options("https://auth.example.com/token")),
//!         Arc::new(fetcher.clone()),
//!         Arc::new(InMemoryTokenCache::new()),
//!     )?
//!     .with_clock(Arc::new(clock.clone()));
//! }
//! ```

pub mod fixtures;
pub mod mock_clock;
pub mod mock_fetcher;
pub mod token_endpoint;

pub use fixtures::*;
pub use mock_clock::*;
pub use mock_fetcher::*;
pub use token_endpoint::*;
