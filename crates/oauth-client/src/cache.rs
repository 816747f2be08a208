//! Token cache contract and in-memory implementation.
//!
//! The cache is a plain store keyed by client name: it holds the most recent
//! token per client and knows nothing about expiry or refresh. The manager
//! re-validates expiry on every read, so an implementation that evicts
//! entries on its own schedule (for example a distributed cache with TTLs)
//! is transparent to it.

use crate::token::AccessToken;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Stores the latest access token per client name.
///
/// Implementations must tolerate concurrent `get`/`set` calls from many
/// tasks without external locking. Writes are last-write-wins.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// The cached token for `client_name`, if any.
    async fn get(&self, client_name: &str) -> Option<AccessToken>;

    /// Store `token` as the latest token for `client_name`.
    async fn set(&self, client_name: &str, token: AccessToken);
}

/// Process-local token cache. Entries are never evicted.
#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl InMemoryTokenCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the token for `client_name`, returning it if present.
    pub async fn remove(&self, client_name: &str) -> Option<AccessToken> {
        self.tokens.write().await.remove(client_name)
    }

    /// Number of clients with a cached token.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Whether no token is cached.
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, client_name: &str) -> Option<AccessToken> {
        self.tokens.read().await.get(client_name).cloned()
    }

    async fn set(&self, client_name: &str, token: AccessToken) {
        self.tokens
            .write()
            .await
            .insert(client_name.to_string(), token);
    }
}
