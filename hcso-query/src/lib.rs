//! # hcso-query
//!
//! Resilient, cached, rate-limited access to flaky, quota-limited external
//! providers.
//!
//! A caller hands the [`QueryClient`] a [`QueryDescriptor`] and a fetch
//! function. The client answers from the cache when it can, otherwise paces
//! the call through the provider's [`RateLimiter`], retries transient
//! failures with exponential delay, caches the successful payload and
//! returns a typed [`ClientResult`] with cache metadata.
//!
//! ## Design
//!
//! - Cache keyed by a SHA-256 digest of the operation and its sorted
//!   parameters, with file and in-memory backends and lazy expiry
//! - One rate limiter per provider; spacing stretches after repeated
//!   failures and carries random jitter
//! - Structured [`ProviderError`]s classified into retryable or fatal, never
//!   by matching message text
//! - Cache failures degrade to a miss and never fail a query
//! - Keyword [`ranking`] for choosing which results deserve follow-up fetches
//!
//! ## Security
//!
//! - Queries are logged only at trace level
//! - HTTP error messages never include the request URL
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> Result<(), hcso_query::QueryError> {
//! use std::sync::Arc;
//! use hcso_query::{
//!     BackoffPolicy, CacheStore, ClientConfig, QueryClient, QueryDescriptor, RateLimiter,
//! };
//!
//! let config = ClientConfig::default();
//! let limiter = Arc::new(RateLimiter::new("example", BackoffPolicy::from_config(&config)));
//! let client = QueryClient::new(config, CacheStore::memory(100), limiter)?;
//!
//! let descriptor = QueryDescriptor::new("lookup").param("target", "example.com");
//! let http = reqwest::Client::new();
//! let outcome = client
//!     .query(&descriptor, || {
//!         hcso_query::http::fetch_json::<serde_json::Value>(
//!             http.get("https://api.example.com/lookup?target=example.com"),
//!         )
//!     })
//!     .await;
//! println!("{}", outcome.status());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod classify;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod http;
pub mod ranking;
pub mod rate_limiter;
pub mod retry;
pub mod types;

pub use cache::{CacheBackend, CacheKey, CacheStore, FileCacheBackend, MemoryCacheBackend};
pub use classify::{default_classifier, Retryability};
pub use client::QueryClient;
pub use config::ClientConfig;
pub use error::{CacheError, ProviderError, ProviderErrorKind, QueryError, Result};
pub use ranking::{rank, Rankable, ScoredResult};
pub use rate_limiter::{BackoffPolicy, RateLimiter, RateLimiterRegistry};
pub use retry::{AttemptOutcome, RetryEngine, RetryPolicy};
pub use types::{
    CacheStatus, ClientResult, ParamValue, QueryDescriptor, QueryOutcome, QueryStatus,
    ResultCount, SearchHit,
};
