//! Secret types for client secrets and bearer tokens.
//!
//! Re-exports [`secrecy`] so callers do not need a direct dependency. Client
//! secrets and access token values are always held as [`SecretString`]; their
//! `Debug` output is redacted and they are zeroized on drop. Reading the raw
//! value requires an explicit [`ExposeSecret::expose_secret`] call, which
//! keeps every place a credential leaves the process easy to find.
//!
//! # Example
//!
//! ```rust
//! use oauth_client::secret::{ExposeSecret, SecretString};
//!
//! let secret = SecretString::from("s1");
//! assert!(!format!("{secret:?}").contains("s1"));
//! assert_eq!(secret.expose_secret(), "s1");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

/// Build the `Authorization` header value for a bearer token.
///
/// The returned string contains the raw token and must not be logged.
#[must_use]
pub fn bearer_header_value(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
