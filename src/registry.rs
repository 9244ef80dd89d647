//! Per-provider query clients sharing one cache.
//!
//! The registry owns the cache backend chosen in `[cache]` and one
//! [`RateLimiter`](hcso_query::RateLimiter) per provider name. Clients are
//! built on first request and reused afterwards, so every caller talking to
//! the same provider shares its call spacing and failure count.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use hcso_query::{BackoffPolicy, CacheStore, QueryClient, RateLimiterRegistry};

use crate::config::{CacheBackendKind, HcsoConfig};
use crate::error::Result;

/// Hands out one [`QueryClient`] per provider.
#[derive(Debug)]
pub struct ProviderRegistry {
    config: HcsoConfig,
    cache: CacheStore,
    limiters: RateLimiterRegistry,
    clients: Mutex<HashMap<String, QueryClient>>,
}

impl ProviderRegistry {
    /// Validate `config` and open the configured cache backend.
    ///
    /// # Errors
    ///
    /// Returns [`HcsoError::Config`](crate::HcsoError::Config) if validation fails.
    pub fn from_config(config: &HcsoConfig) -> Result<Self> {
        let cache = match config.cache.backend {
            CacheBackendKind::File => {
                let dir = config.cache.resolved_dir();
                tracing::info!(dir = %dir.display(), "using file cache");
                CacheStore::file(dir)
            }
            CacheBackendKind::Memory => {
                tracing::info!(capacity = config.cache.memory_capacity, "using memory cache");
                CacheStore::memory(config.cache.memory_capacity)
            }
        };
        Self::with_cache(config, cache)
    }

    /// Like [`from_config`](Self::from_config) but with a caller-supplied cache.
    ///
    /// # Errors
    ///
    /// Returns [`HcsoError::Config`](crate::HcsoError::Config) if validation fails.
    pub fn with_cache(config: &HcsoConfig, cache: CacheStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: config.clone(),
            cache,
            limiters: RateLimiterRegistry::new(),
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// The client for `provider`, created on first use.
    ///
    /// # Errors
    ///
    /// Returns [`HcsoError::UnknownProvider`](crate::HcsoError::UnknownProvider)
    /// for an unconfigured provider when `strict_providers` is set.
    pub fn client(&self, provider: &str) -> Result<QueryClient> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(provider) {
            return Ok(client.clone());
        }

        let config = self.config.client_config_for(provider)?;
        let limiter = self
            .limiters
            .get_or_create(provider, BackoffPolicy::from_config(&config));
        let client = QueryClient::new(config, self.cache.clone(), limiter)?;
        tracing::debug!(provider, "created query client");
        clients.insert(provider.to_owned(), client.clone());
        Ok(client)
    }

    /// Providers that have a client so far, sorted.
    pub fn active_providers(&self) -> Vec<String> {
        self.limiters.domains()
    }

    /// The shared cache.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The configuration the registry was built from.
    pub fn config(&self) -> &HcsoConfig {
        &self.config
    }
}
