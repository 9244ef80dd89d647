//! Bounded retries with exponential delay.
//!
//! The [`RetryEngine`] drives one query's fetch attempts. Every attempt goes
//! through the provider's [`RateLimiter`] first, so retries never exceed the
//! provider's pacing. Failures are classified by a caller-supplied function;
//! fatal ones stop immediately, retryable ones are retried after
//! `min(base_delay * 2^(attempt - 1), max_delay)` until `max_attempts` is
//! used up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::classify::Retryability;
use crate::config::ClientConfig;
use crate::error::ProviderError;
use crate::rate_limiter::RateLimiter;
use crate::types::ClientResult;

/// Result of a single fetch attempt, after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    /// The fetch returned a payload.
    Success(T),
    /// The fetch failed, but trying again may help.
    RetryableFailure(ProviderError),
    /// The fetch failed for good.
    FatalFailure(ProviderError),
}

impl<T> AttemptOutcome<T> {
    /// Classify the raw result of one fetch.
    pub fn from_result<C>(result: Result<T, ProviderError>, classify: C) -> Self
    where
        C: Fn(&ProviderError) -> Retryability,
    {
        match result {
            Ok(payload) => Self::Success(payload),
            Err(err) => match classify(&err) {
                Retryability::Retryable => Self::RetryableFailure(err),
                Retryability::Fatal => Self::FatalFailure(err),
            },
        }
    }
}

/// Attempt limit and delay curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl RetryPolicy {
    /// Extract the retry settings from a client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        2_u32
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Runs a fetch function under a retry policy and a shared rate limiter.
#[derive(Debug, Clone)]
pub struct RetryEngine {
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    base_interval: Duration,
}

impl RetryEngine {
    /// Create an engine that paces attempts through `limiter`.
    pub fn new(policy: RetryPolicy, limiter: Arc<RateLimiter>, base_interval: Duration) -> Self {
        Self {
            policy,
            limiter,
            base_interval,
        }
    }

    /// The retry policy in force.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The limiter every attempt waits on.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run `fetch` until it succeeds, fails fatally, runs out of attempts or
    /// `cancel` fires.
    ///
    /// Cancellation is checked before each slot wait, before each fetch and
    /// during each retry delay. A fetch already in flight is allowed to
    /// finish.
    pub async fn execute<T, F, Fut, C>(
        &self,
        mut fetch: F,
        classify: C,
        cancel: &CancellationToken,
    ) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        C: Fn(&ProviderError) -> Retryability,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let domain = self.limiter.domain();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return ClientResult::Cancelled { attempts: attempt };
            }
            if !self
                .limiter
                .await_slot_cancellable(self.base_interval, cancel)
                .await
            {
                return ClientResult::Cancelled { attempts: attempt };
            }
            if cancel.is_cancelled() {
                return ClientResult::Cancelled { attempts: attempt };
            }

            attempt += 1;
            match AttemptOutcome::from_result(fetch().await, &classify) {
                AttemptOutcome::Success(payload) => {
                    self.limiter.record_success().await;
                    if attempt > 1 {
                        tracing::info!(domain, attempts = attempt, "query succeeded after retries");
                    }
                    return ClientResult::Success {
                        payload,
                        attempts: attempt,
                    };
                }
                AttemptOutcome::FatalFailure(reason) => {
                    tracing::warn!(domain, attempt, error = %reason, "fatal provider error");
                    return ClientResult::Fatal {
                        reason,
                        attempts: attempt,
                    };
                }
                AttemptOutcome::RetryableFailure(reason) => {
                    self.limiter.record_failure().await;
                    if attempt >= max_attempts {
                        tracing::warn!(
                            domain,
                            attempts = attempt,
                            error = %reason,
                            "retries exhausted"
                        );
                        return ClientResult::Exhausted {
                            last_reason: reason,
                            attempts: max_attempts,
                        };
                    }

                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        domain,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "retryable provider error, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return ClientResult::Cancelled { attempts: attempt };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
