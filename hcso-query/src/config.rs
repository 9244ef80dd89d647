//! Client configuration with sensible defaults.
//!
//! [`ClientConfig`] controls slot spacing, adaptive backoff, retry limits,
//! cache freshness and request behaviour. The defaults are tuned for polite
//! use of quota-limited public providers: one call every five seconds,
//! five attempts, results cached for a day.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Configuration for one provider's query client.
///
/// Every field has a serde default, so a partial TOML table deserialises
/// into a complete configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Minimum spacing between outbound calls under normal conditions.
    pub base_interval_ms: u64,
    /// Total attempts per query, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on every further attempt.
    pub base_delay_ms: u64,
    /// Upper bound for a single retry delay.
    pub max_delay_ms: u64,
    /// Default freshness requirement for descriptors without their own.
    pub cache_max_age_secs: u64,
    /// Consecutive failures tolerated before slot spacing starts to stretch.
    pub failure_threshold: u32,
    /// Spacing multiplier applied per failure beyond the threshold.
    pub backoff_multiplier: f64,
    /// Cap on how many times the multiplier is applied.
    pub max_backoff_steps: u32,
    /// Random jitter range in milliseconds `(min, max)` added to each slot.
    pub jitter_ms: (u64, u64),
    /// Whether to read from and write to the cache at all.
    pub use_cache: bool,
    /// Per-request timeout for the built-in HTTP and subprocess helpers.
    pub timeout_seconds: u64,
    /// Custom User-Agent string. If `None`, rotates through a built-in list
    /// of realistic browser User-Agents.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 5_000,
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            cache_max_age_secs: 86_400,
            failure_threshold: 3,
            backoff_multiplier: 1.5,
            max_backoff_steps: 5,
            jitter_ms: (0, 1_000),
            use_cache: true,
            timeout_seconds: 15,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `max_attempts` must be greater than 0
    /// - `timeout_seconds` must be greater than 0
    /// - `base_delay_ms` must be <= `max_delay_ms`
    /// - `jitter_ms.0` must be <= `jitter_ms.1`
    /// - `backoff_multiplier` must be finite and >= 1.0
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.max_attempts == 0 {
            return Err(QueryError::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(QueryError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(QueryError::Config(
                "base_delay_ms must be <= max_delay_ms".into(),
            ));
        }
        if self.jitter_ms.0 > self.jitter_ms.1 {
            return Err(QueryError::Config("jitter_ms min must be <= max".into()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(QueryError::Config(
                "backoff_multiplier must be a finite value >= 1.0".into(),
            ));
        }
        Ok(())
    }

    /// Build a configuration from a calls-per-second budget, the way
    /// provider quotas are usually published.
    ///
    /// A non-positive rate leaves the default spacing untouched.
    pub fn with_calls_per_second(mut self, calls_per_second: f64) -> Self {
        if calls_per_second > 0.0 && calls_per_second.is_finite() {
            self.base_interval_ms = (1_000.0 / calls_per_second).round() as u64;
        }
        self
    }

    /// Minimum spacing between calls.
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    /// Delay before the second attempt.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Upper bound for a single retry delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Default cache freshness requirement.
    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    /// Request timeout for the fetch helpers.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
