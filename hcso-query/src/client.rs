//! The query client: cache, rate limiter and retry engine behind one call.
//!
//! ```text
//! query(descriptor, fetch)
//!   ├─ cache lookup ── fresh hit ──────────────────────────► Success { attempts: 0 }
//!   └─ miss ─► await slot ─► fetch ─► classify ─┬─ retry ──┐
//!                  ▲                            │          │
//!                  └────────────────────────────┼──────────┘
//!                                               ├─ Success ─► cache store ─► caller
//!                                               └─ Exhausted / Fatal / Cancelled ─► caller
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheKey, CacheStore};
use crate::classify::{default_classifier, Retryability};
use crate::config::ClientConfig;
use crate::error::{ProviderError, QueryError};
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryEngine, RetryPolicy};
use crate::types::{CacheStatus, ClientResult, QueryDescriptor, QueryOutcome};

/// Cached, rate-limited, retrying access to one provider.
///
/// Cheap to clone; clones share the cache and the rate limiter.
#[derive(Debug, Clone)]
pub struct QueryClient {
    config: ClientConfig,
    cache: CacheStore,
    engine: RetryEngine,
}

impl QueryClient {
    /// Assemble a client from its collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Config`] if `config` fails validation.
    pub fn new(
        config: ClientConfig,
        cache: CacheStore,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, QueryError> {
        config.validate()?;
        let engine = RetryEngine::new(
            RetryPolicy::from_config(&config),
            limiter,
            config.base_interval(),
        );
        Ok(Self {
            config,
            cache,
            engine,
        })
    }

    /// The configuration in force.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The shared cache.
    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The provider's rate limiter.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.engine.limiter()
    }

    /// Run a query with the default classifier and no cancellation.
    pub async fn query<T, F, Fut>(&self, descriptor: &QueryDescriptor, fetch: F) -> QueryOutcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.query_with(descriptor, fetch, default_classifier, &CancellationToken::new())
            .await
    }

    /// Run a query that the caller may abandon through `cancel`.
    pub async fn query_with_cancel<T, F, Fut>(
        &self,
        descriptor: &QueryDescriptor,
        fetch: F,
        cancel: &CancellationToken,
    ) -> QueryOutcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        self.query_with(descriptor, fetch, default_classifier, cancel)
            .await
    }

    /// Run a query with a custom failure classifier.
    ///
    /// A fresh cache entry is returned without calling `fetch`. A cached
    /// payload that no longer decodes as `T` is treated as a miss.
    pub async fn query_with<T, F, Fut, C>(
        &self,
        descriptor: &QueryDescriptor,
        fetch: F,
        classify: C,
        cancel: &CancellationToken,
    ) -> QueryOutcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        C: Fn(&ProviderError) -> Retryability,
    {
        tracing::trace!(
            operation = %descriptor.operation,
            params = ?descriptor.params,
            "query requested"
        );

        if !self.config.use_cache {
            let result = self.engine.execute(fetch, classify, cancel).await;
            return QueryOutcome {
                result,
                cache: CacheStatus::Bypassed,
            };
        }

        let key = CacheKey::from_descriptor(descriptor);
        let max_age = descriptor
            .max_age
            .unwrap_or_else(|| self.config.cache_max_age());

        if let Some(cached) = self.cache.lookup(&key, max_age).await {
            match serde_json::from_value::<T>(cached) {
                Ok(payload) => {
                    return QueryOutcome {
                        result: ClientResult::Success {
                            payload,
                            attempts: 0,
                        },
                        cache: CacheStatus::Hit,
                    };
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "cached payload has unexpected shape, refetching");
                }
            }
        }

        let result = self.engine.execute(fetch, classify, cancel).await;

        if let ClientResult::Success { payload, .. } = &result {
            match serde_json::to_value(payload) {
                Ok(value) => {
                    // Cache write failures stop here; the fetched payload is still returned.
                    if let Err(e) = self.cache.store(&key, value).await {
                        tracing::warn!(%key, error = %e, "failed to write cache entry");
                    }
                }
                Err(e) => {
                    tracing::warn!(%key, error = %e, "payload not serialisable, skipping cache");
                }
            }
        }

        QueryOutcome {
            result,
            cache: CacheStatus::Miss,
        }
    }

    /// Run several independent queries concurrently.
    ///
    /// All of them share this client's rate limiter, so call spacing still
    /// holds. Outcomes are returned in descriptor order.
    pub async fn query_batch<T, F, Fut>(
        &self,
        descriptors: &[QueryDescriptor],
        fetch_for: F,
    ) -> Vec<QueryOutcome<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(&QueryDescriptor) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let fetch_for = &fetch_for;
        join_all(
            descriptors
                .iter()
                .map(|descriptor| self.query(descriptor, move || fetch_for(descriptor))),
        )
        .await
    }
}
