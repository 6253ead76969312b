//! Circuit breaker: makes a call boundary fail fast and predictably instead
//! of hanging or cascading.
//!
//! # States
//! - **Closed**: normal operation, calls flow through.
//! - **Open**: downstream assumed unhealthy, calls rejected immediately.
//! - **Half-open**: probing recovery; limited traffic allowed through.
//!
//! # Transitions
//! ```text
//! Closed    → Open      when consecutive failures reach failure_threshold
//! Open      → Half-open lazily, on the next call once recovery_timeout has
//!                       elapsed since the last failure (no background timer)
//! Half-open → Closed    after success_threshold consecutive successes
//! Half-open → Open      immediately on any single failure
//! ```
//!
//! Independently of state, a concurrency cap bounds in-flight calls and
//! rejects the excess — backpressure that applies even while closed.

use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Breaker tuning parameters.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip Closed → Open.
    pub failure_threshold: u32,
    /// Consecutive successes that restore Half-open → Closed.
    pub success_threshold: u32,
    /// How long to stay Open before the next call may probe recovery.
    pub recovery_timeout: Duration,
    /// Per-call timeout enforced on the wrapped operation.
    pub call_timeout: Duration,
    /// Maximum in-flight calls before rejection.
    pub max_concurrent: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(60),
            max_concurrent: 32,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing fast; calls rejected without reaching the operation.
    Open,
    /// Probing recovery.
    HalfOpen,
}

/// Rejections and failures surfaced by [`CircuitBreaker::call`].
///
/// Rejections (`Open`, `AtCapacity`) are never retried by the breaker
/// itself — the caller decides.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Circuit is open; the operation was not invoked.
    #[error("circuit `{name}` is open ({since_last_failure:?} since last failure)")]
    Open {
        /// Breaker name.
        name: String,
        /// Time elapsed since the failure that keeps the circuit open.
        since_last_failure: Duration,
    },
    /// Concurrency cap reached; the operation was not invoked.
    #[error("circuit `{name}` at concurrency limit ({in_flight}/{max_concurrent})")]
    AtCapacity {
        /// Breaker name.
        name: String,
        /// In-flight calls observed at rejection time.
        in_flight: u32,
        /// Configured cap.
        max_concurrent: u32,
    },
    /// The operation exceeded the per-call timeout.
    #[error("operation timed out after {after:?}")]
    Timeout {
        /// The enforced timeout.
        after: Duration,
    },
    /// The operation itself returned an error.
    #[error("operation failed: {0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Whether this is a rejection (the operation was never invoked).
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::AtCapacity { .. })
    }
}

/// Mutable breaker state, guarded by one mutex.
#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<Instant>,
    last_success_at: Option<Instant>,
    total_calls: u64,
    total_successes: u64,
    total_failures: u64,
    total_timeouts: u64,
    total_rejections: u64,
}

/// Read-only snapshot of breaker state and counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Breaker name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Consecutive successes since the last failure.
    pub consecutive_successes: u32,
    /// Calls admitted past the rejection checks.
    pub total_calls: u64,
    /// Successful operations.
    pub total_successes: u64,
    /// Failed operations (timeouts included).
    pub total_failures: u64,
    /// Operations cut off by the per-call timeout.
    pub total_timeouts: u64,
    /// Calls rejected while open or at the concurrency cap.
    pub total_rejections: u64,
    /// Fraction of admitted calls that failed.
    pub failure_rate: f64,
    /// Calls currently in flight.
    pub in_flight: u32,
    /// Time since the most recent failure.
    pub since_last_failure_ms: Option<u64>,
    /// Time since the most recent success.
    pub since_last_success_ms: Option<u64>,
}

/// Holds one reserved in-flight slot; gives it back on drop. Calls abandoned
/// mid-await (the caller dropping the `call` future) release their slot the
/// same way completed calls do.
struct InFlightSlot<'a> {
    counter: &'a AtomicU32,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Wraps a call boundary with failure tracking, a per-call timeout, and a
/// concurrency cap.
///
/// Shared freely across concurrently executing jobs: state lives behind its
/// own mutex and the in-flight counter is atomic.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    in_flight: AtomicU32,
}

impl Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.inner.lock().state)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Create a named breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_at: None,
                last_success_at: None,
                total_calls: 0,
                total_successes: 0,
                total_failures: 0,
                total_timeouts: 0,
                total_rejections: 0,
            }),
            in_flight: AtomicU32::new(0),
        }
    }

    /// Breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute `op` through the breaker.
    ///
    /// Rejects immediately while open (until `recovery_timeout` has elapsed
    /// since the last failure) or when in-flight calls have reached
    /// `max_concurrent` — in both cases `op` is never invoked. Otherwise the
    /// operation runs under `call_timeout`; the caller unblocks at roughly
    /// the timeout even if the operation has not returned.
    ///
    /// Timeout cancellation is best-effort: the operation's future is dropped
    /// at the deadline, which cancels it at its next await point. Work that
    /// never yields, or that was handed off to another thread, may keep
    /// running after the caller has already seen the timeout error.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        // Open-state check (with the lazy half-open transition) under the lock.
        {
            let mut inner = self.inner.lock();
            if inner.state == CircuitState::Open {
                let since = inner
                    .last_failure_at
                    .map_or(Duration::ZERO, |at| at.elapsed());
                if since < self.config.recovery_timeout {
                    inner.total_rejections += 1;
                    debug!(breaker = %self.name, ?since, "rejecting call: circuit open");
                    return Err(BreakerError::Open {
                        name: self.name.clone(),
                        since_last_failure: since,
                    });
                }
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                info!(breaker = %self.name, "recovery timeout elapsed, transitioning to half-open");
            }
        }

        // Concurrency cap, orthogonal to open/closed. Reserve optimistically
        // and back out on rejection so the counter can never go negative.
        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel);
        if in_flight >= self.config.max_concurrent {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            self.inner.lock().total_rejections += 1;
            warn!(
                breaker = %self.name,
                in_flight,
                max_concurrent = self.config.max_concurrent,
                "rejecting call: concurrency limit"
            );
            return Err(BreakerError::AtCapacity {
                name: self.name.clone(),
                in_flight,
                max_concurrent: self.config.max_concurrent,
            });
        }

        let _slot = InFlightSlot {
            counter: &self.in_flight,
        };

        let outcome = tokio::time::timeout(self.config.call_timeout, op()).await;

        match outcome {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure(false);
                Err(BreakerError::Inner(err))
            }
            Err(_elapsed) => {
                self.record_failure(true);
                Err(BreakerError::Timeout {
                    after: self.config.call_timeout,
                })
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.total_successes += 1;
        inner.consecutive_successes += 1;
        inner.consecutive_failures = 0;
        inner.last_success_at = Some(Instant::now());

        if inner.state == CircuitState::HalfOpen
            && inner.consecutive_successes >= self.config.success_threshold
        {
            inner.state = CircuitState::Closed;
            inner.consecutive_successes = 0;
            info!(breaker = %self.name, "closing circuit: downstream recovered");
        }
    }

    fn record_failure(&self, timed_out: bool) {
        let mut inner = self.inner.lock();
        inner.total_calls += 1;
        inner.total_failures += 1;
        if timed_out {
            inner.total_timeouts += 1;
        }
        inner.consecutive_failures += 1;
        inner.consecutive_successes = 0;
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        breaker = %self.name,
                        consecutive_failures = inner.consecutive_failures,
                        threshold = self.config.failure_threshold,
                        "opening circuit"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                warn!(breaker = %self.name, "reopening circuit: half-open probe failed");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Read-only snapshot of state, counters, and rates.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        let failure_rate = if inner.total_calls == 0 {
            0.0
        } else {
            inner.total_failures as f64 / inner.total_calls as f64
        };
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_calls: inner.total_calls,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            total_timeouts: inner.total_timeouts,
            total_rejections: inner.total_rejections,
            failure_rate,
            in_flight: self.in_flight.load(Ordering::Acquire),
            since_last_failure_ms: inner
                .last_failure_at
                .map(|at| at.elapsed().as_millis() as u64),
            since_last_success_ms: inner
                .last_success_at
                .map(|at| at.elapsed().as_millis() as u64),
        }
    }

    /// Administrative override: open the circuit now. The next call after
    /// `recovery_timeout` probes as usual.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Open;
        inner.last_failure_at = Some(Instant::now());
        warn!(breaker = %self.name, "circuit forced open");
    }

    /// Administrative override: close the circuit and reset failure counters.
    pub fn force_close(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        info!(breaker = %self.name, "circuit forced closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            recovery_timeout: Duration::from_millis(100),
            call_timeout: Duration::from_millis(200),
            max_concurrent: 4,
        }
    }

    #[tokio::test]
    async fn test_opens_after_consecutive_failures() {
        let breaker = CircuitBreaker::new("test", quick_config());
        for _ in 0..3 {
            let result: Result<(), _> = breaker.call(|| async { Err("boom") }).await;
            assert!(matches!(result, Err(BreakerError::Inner(_))));
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let breaker = CircuitBreaker::new("test", quick_config());
        for _ in 0..2 {
            let _: Result<(), _> = breaker.call(|| async { Err("boom") }).await;
        }
        let _: Result<_, BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
        let _: Result<(), _> = breaker.call(|| async { Err("boom") }).await;
        // Streak restarted at 1, still closed.
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_force_open_and_close() {
        let breaker = CircuitBreaker::new("test", quick_config());
        breaker.force_open();
        assert_eq!(breaker.state(), CircuitState::Open);
        let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));

        breaker.force_close();
        assert_eq!(breaker.state(), CircuitState::Closed);
        let result: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let breaker = CircuitBreaker::new("stats", quick_config());
        let _: Result<(), BreakerError<&str>> = breaker.call(|| async { Ok(()) }).await;
        let _: Result<(), _> = breaker.call(|| async { Err("boom") }).await;

        let stats = breaker.stats();
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_successes, 1);
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.in_flight, 0);
        assert!((stats.failure_rate - 0.5).abs() < 1e-9);
        assert!(stats.since_last_failure_ms.is_some());
    }
}
