//! Per-provider rate limiting with adaptive backoff.
//!
//! A [`RateLimiter`] guards one rate-limit domain (usually one provider).
//! It spaces outbound calls at least `effective_interval` apart, where the
//! interval stretches multiplicatively once consecutive failures pass a
//! threshold, plus a random jitter so concurrent callers do not fire in
//! lockstep.
//!
//! # Slot reservation
//!
//! ```text
//!  caller A ──lock──► reserve t0 ──unlock──► sleep until t0 ──► fetch
//!  caller B ──lock (queued)──► reserve t0 + interval ──unlock──► sleep ──► fetch
//! ```
//!
//! Slots are reserved under a fair [`tokio::sync::Mutex`], so callers are
//! granted slots in the order they asked for them. The sleep happens after
//! the lock is released: a waiting caller never blocks
//! [`RateLimiter::record_success`] or [`RateLimiter::record_failure`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;

/// Stand-in deadline when a stretched interval overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// How slot spacing reacts to consecutive failures.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Failures tolerated before the interval starts to grow.
    pub failure_threshold: u32,
    /// Growth factor per failure beyond the threshold.
    pub multiplier: f64,
    /// Maximum number of times `multiplier` is applied.
    pub max_steps: u32,
    /// Jitter range in milliseconds `(min, max)`.
    pub jitter_ms: (u64, u64),
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            multiplier: 1.5,
            max_steps: 5,
            jitter_ms: (0, 1_000),
        }
    }
}

impl BackoffPolicy {
    /// Extract the backoff settings from a client configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            multiplier: config.backoff_multiplier,
            max_steps: config.max_backoff_steps,
            jitter_ms: config.jitter_ms,
        }
    }

    /// Spacing for the given failure count, without jitter.
    ///
    /// ```text
    /// failures < threshold   →  base
    /// failures >= threshold  →  base * multiplier ^ min(failures - threshold + 1, max_steps)
    /// ```
    ///
    /// Never below `base` and non-decreasing in `failures`.
    pub fn backoff_interval(&self, base: Duration, failures: u32) -> Duration {
        if failures < self.failure_threshold || base.is_zero() {
            return base;
        }
        let steps = failures
            .saturating_sub(self.failure_threshold)
            .saturating_add(1)
            .min(self.max_steps);
        let factor = self.multiplier.max(1.0).powi(i32::try_from(steps).unwrap_or(i32::MAX));
        Duration::try_from_secs_f64(base.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX)
            .max(base)
    }

    /// Draw one jitter sample from the configured range.
    pub fn sample_jitter(&self) -> Duration {
        let (min, max) = self.jitter_ms;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Mutable state of one rate-limit domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateState {
    /// When the most recently granted slot starts.
    pub last_call_at: Option<Instant>,
    /// Retryable failures since the last success.
    pub consecutive_failures: u32,
}

/// Spaces calls to one provider and stretches the spacing after failures.
#[derive(Debug)]
pub struct RateLimiter {
    domain: String,
    policy: BackoffPolicy,
    state: Mutex<RateState>,
}

impl RateLimiter {
    /// Create a limiter for the named domain.
    pub fn new(domain: impl Into<String>, policy: BackoffPolicy) -> Self {
        Self {
            domain: domain.into(),
            policy,
            state: Mutex::new(RateState::default()),
        }
    }

    /// Name of the rate-limit domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The backoff policy in force.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> RateState {
        *self.state.lock().await
    }

    /// Retryable failures since the last success.
    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }

    /// Spacing that would apply to the next slot, without jitter.
    pub async fn current_interval(&self, base_interval: Duration) -> Duration {
        let failures = self.consecutive_failures().await;
        self.policy.backoff_interval(base_interval, failures)
    }

    /// Wait for the next slot, then return.
    ///
    /// Slots are at least `effective_interval` apart and are granted in
    /// request order. The first slot of a fresh limiter is immediate.
    pub async fn await_slot(&self, base_interval: Duration) {
        let (slot, _) = self.reserve_slot(base_interval).await;
        tokio::time::sleep_until(slot).await;
    }

    /// Like [`await_slot`](Self::await_slot) but gives up when `cancel` fires.
    ///
    /// Returns `false` if cancelled before the slot was reached. An abandoned
    /// slot is handed back unless a later caller has already queued behind it.
    pub async fn await_slot_cancellable(
        &self,
        base_interval: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let (slot, previous) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            reserved = self.reserve_slot(base_interval) => reserved,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.release_slot(slot, previous).await;
                false
            }
            _ = tokio::time::sleep_until(slot) => true,
        }
    }

    /// Reset the failure count after a successful call.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        if state.consecutive_failures > 0 {
            tracing::debug!(
                domain = %self.domain,
                failures = state.consecutive_failures,
                "provider recovered, resetting backoff"
            );
        }
        state.consecutive_failures = 0;
    }

    /// Count a retryable failure.
    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.policy.failure_threshold {
            tracing::warn!(
                domain = %self.domain,
                failures = state.consecutive_failures,
                "failure threshold reached, stretching call spacing"
            );
        }
    }

    /// Reserve the next slot. Returns its start and the slot it replaced.
    async fn reserve_slot(&self, base_interval: Duration) -> (Instant, Option<Instant>) {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let previous = state.last_call_at;
        let slot = match previous {
            None => now,
            Some(last) => {
                let interval = self
                    .policy
                    .backoff_interval(base_interval, state.consecutive_failures)
                    .saturating_add(self.policy.sample_jitter());
                last.checked_add(interval)
                    .unwrap_or_else(|| now + FAR_FUTURE)
                    .max(now)
            }
        };
        state.last_call_at = Some(slot);
        let wait = slot.saturating_duration_since(now);
        if !wait.is_zero() {
            tracing::debug!(
                domain = %self.domain,
                wait_ms = wait.as_millis() as u64,
                "rate limited: waiting for slot"
            );
        }
        (slot, previous)
    }

    /// Undo an unused reservation if it is still the latest one.
    async fn release_slot(&self, slot: Instant, previous: Option<Instant>) {
        let mut state = self.state.lock().await;
        if state.last_call_at == Some(slot) {
            state.last_call_at = previous;
            tracing::debug!(domain = %self.domain, "released abandoned slot");
        }
    }
}

/// Hands out one shared [`RateLimiter`] per domain name.
///
/// Limiters for different domains are independent: a slow provider never
/// delays calls to another one.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: StdMutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The limiter for `domain`, created with `policy` on first use.
    ///
    /// Later calls for the same domain return the existing limiter and
    /// ignore `policy`.
    pub fn get_or_create(&self, domain: &str, policy: BackoffPolicy) -> Arc<RateLimiter> {
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(
            limiters
                .entry(domain.to_owned())
                .or_insert_with(|| Arc::new(RateLimiter::new(domain, policy))),
        )
    }

    /// Names of all domains seen so far.
    pub fn domains(&self) -> Vec<String> {
        let limiters = self
            .limiters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut names: Vec<String> = limiters.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy {
            jitter_ms: (0, 0),
            ..Default::default()
        }
    }

    #[test]
    fn default_policy_values() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.failure_threshold, 3);
        assert!((policy.multiplier - 1.5).abs() < f64::EPSILON);
        assert_eq!(policy.max_steps, 5);
        assert_eq!(policy.jitter_ms, (0, 1_000));
    }

    #[test]
    fn policy_from_config() {
        let config = ClientConfig {
            failure_threshold: 2,
            backoff_multiplier: 2.0,
            max_backoff_steps: 3,
            jitter_ms: (10, 20),
            ..Default::default()
        };
        let policy = BackoffPolicy::from_config(&config);
        assert_eq!(policy.failure_threshold, 2);
        assert_eq!(policy.max_steps, 3);
        assert_eq!(policy.jitter_ms, (10, 20));
    }

    #[test]
    fn interval_is_base_below_threshold() {
        let policy = no_jitter();
        let base = Duration::from_secs(5);
        for failures in 0..policy.failure_threshold {
            assert_eq!(policy.backoff_interval(base, failures), base);
        }
    }

    #[test]
    fn interval_grows_from_threshold() {
        let policy = no_jitter();
        let base = Duration::from_secs(2);
        assert_eq!(policy.backoff_interval(base, 3), Duration::from_secs(3));
        assert_eq!(
            policy.backoff_interval(base, 4),
            Duration::from_secs_f64(2.0 * 1.5 * 1.5)
        );
    }

    #[test]
    fn interval_caps_at_max_steps() {
        let policy = no_jitter();
        let base = Duration::from_secs(1);
        let capped = policy.backoff_interval(base, 7);
        assert_eq!(capped, Duration::from_secs_f64(1.5_f64.powi(5)));
        assert_eq!(policy.backoff_interval(base, 50), capped);
        assert_eq!(policy.backoff_interval(base, u32::MAX), capped);
    }

    #[test]
    fn huge_step_cap_saturates_instead_of_panicking() {
        let policy = BackoffPolicy {
            max_steps: u32::MAX,
            ..no_jitter()
        };
        let interval = policy.backoff_interval(Duration::from_secs(1), u32::MAX);
        assert_eq!(interval, Duration::MAX);
    }

    #[test]
    fn interval_monotonic_and_never_below_base() {
        let policy = no_jitter();
        for base_ms in [0_u64, 1, 250, 5_000] {
            let base = Duration::from_millis(base_ms);
            let mut previous = Duration::ZERO;
            for failures in 0..20 {
                let interval = policy.backoff_interval(base, failures);
                assert!(interval >= base);
                assert!(interval >= previous, "decreased at {failures} failures");
                previous = interval;
            }
        }
    }

    #[test]
    fn multiplier_below_one_treated_as_one() {
        let policy = BackoffPolicy {
            multiplier: 0.5,
            ..no_jitter()
        };
        let base = Duration::from_secs(1);
        assert_eq!(policy.backoff_interval(base, 10), base);
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = BackoffPolicy {
            jitter_ms: (100, 200),
            ..Default::default()
        };
        for _ in 0..200 {
            let jitter = policy.sample_jitter();
            assert!(jitter >= Duration::from_millis(100));
            assert!(jitter <= Duration::from_millis(200));
        }
    }

    #[test]
    fn zero_jitter_range_is_zero() {
        assert_eq!(no_jitter().sample_jitter(), Duration::ZERO);
    }

    #[tokio::test]
    async fn failures_increment_and_success_resets() {
        let limiter = RateLimiter::new("test", no_jitter());
        limiter.record_failure().await;
        limiter.record_failure().await;
        assert_eq!(limiter.consecutive_failures().await, 2);
        limiter.record_success().await;
        assert_eq!(limiter.consecutive_failures().await, 0);
    }

    #[tokio::test]
    async fn current_interval_reflects_failures() {
        let limiter = RateLimiter::new("test", no_jitter());
        let base = Duration::from_secs(1);
        assert_eq!(limiter.current_interval(base).await, base);
        for _ in 0..3 {
            limiter.record_failure().await;
        }
        assert_eq!(
            limiter.current_interval(base).await,
            Duration::from_millis(1_500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn first_slot_is_immediate() {
        let limiter = RateLimiter::new("test", no_jitter());
        let start = Instant::now();
        limiter.await_slot(Duration::from_secs(10)).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(limiter.state().await.last_call_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_slots_are_spaced() {
        let limiter = RateLimiter::new("test", no_jitter());
        let base = Duration::from_secs(5);
        let start = Instant::now();
        limiter.await_slot(base).await;
        limiter.await_slot(base).await;
        limiter.await_slot(base).await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_stretches_after_threshold() {
        let limiter = RateLimiter::new("test", no_jitter());
        let base = Duration::from_secs(2);
        limiter.await_slot(base).await;
        for _ in 0..3 {
            limiter.record_failure().await;
        }
        let start = Instant::now();
        limiter.await_slot(base).await;
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_granted_in_order() {
        let limiter = Arc::new(RateLimiter::new("test", no_jitter()));
        let base = Duration::from_secs(1);
        let order = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..4_u32 {
            let limiter = Arc::clone(&limiter);
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                limiter.await_slot(base).await;
                order.lock().expect("order lock").push((id, Instant::now()));
            }));
            // Let each task queue on the lock before spawning the next.
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.expect("task");
        }

        let order = order.lock().expect("order lock").clone();
        let ids: Vec<u32> = order.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        for pair in order.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= base);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_wait() {
        let limiter = RateLimiter::new("test", no_jitter());
        let base = Duration::from_secs(60);
        limiter.await_slot(base).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        assert!(!limiter.await_slot_cancellable(base, &cancel).await);
        assert!(start.elapsed() < base);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_slot_does_not_delay_next_caller() {
        let limiter = RateLimiter::new("test", no_jitter());
        let base = Duration::from_secs(60);
        let start = Instant::now();
        limiter.await_slot(base).await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        assert!(!limiter.await_slot_cancellable(base, &cancel).await);

        limiter.await_slot(base).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= base && elapsed < base + Duration::from_secs(1), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_slot_kept_when_another_caller_queued_behind() {
        let limiter = Arc::new(RateLimiter::new("test", no_jitter()));
        let base = Duration::from_secs(10);
        let start = Instant::now();
        limiter.await_slot(base).await;

        let cancel = CancellationToken::new();
        let cancelled = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            let cancel = cancel.clone();
            async move { limiter.await_slot_cancellable(base, &cancel).await }
        });
        tokio::task::yield_now().await;
        let queued = tokio::spawn({
            let limiter = Arc::clone(&limiter);
            async move {
                limiter.await_slot(base).await;
                Instant::now()
            }
        });
        tokio::task::yield_now().await;

        cancel.cancel();
        assert!(!cancelled.await.expect("cancelled task"));
        let granted = queued.await.expect("queued task");
        assert!(granted.duration_since(start) >= base * 2);
        assert_eq!(limiter.state().await.last_call_at, Some(start + base * 2));
    }

    #[tokio::test]
    async fn already_cancelled_returns_false() {
        let limiter = RateLimiter::new("test", no_jitter());
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(
            !limiter
                .await_slot_cancellable(Duration::from_secs(1), &cancel)
                .await
        );
    }

    #[test]
    fn registry_shares_limiter_per_domain() {
        let registry = RateLimiterRegistry::new();
        let a1 = registry.get_or_create("duckduckgo", no_jitter());
        let a2 = registry.get_or_create("duckduckgo", BackoffPolicy::default());
        let b = registry.get_or_create("shodan", no_jitter());
        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(a2.policy().jitter_ms, (0, 0));
        assert_eq!(registry.domains(), vec!["duckduckgo", "shodan"]);
    }

    #[tokio::test(start_paused = true)]
    async fn domains_do_not_block_each_other() {
        let registry = RateLimiterRegistry::new();
        let slow = registry.get_or_create("slow", no_jitter());
        let fast = registry.get_or_create("fast", no_jitter());
        let base = Duration::from_secs(30);

        slow.await_slot(base).await;
        let blocked = tokio::spawn({
            let slow = Arc::clone(&slow);
            async move { slow.await_slot(base).await }
        });
        tokio::task::yield_now().await;

        let start = Instant::now();
        fast.await_slot(base).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        blocked.await.expect("slow task");
    }
}
