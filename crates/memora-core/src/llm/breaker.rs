//! Circuit breaker guarding calls to a degraded dependency.
//!
//! Operation-agnostic: any fallible async operation can be wrapped with
//! [`CircuitBreaker::call`], or gated manually with `try_acquire` /
//! `record_success` / `record_failure` when the operation is not a
//! single future (e.g., a stream whose outcome is known only at the
//! end). The model gateway is the only consumer in this crate.

use std::future::Future;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::{Duration, Instant};

use tracing::warn;

use memora_types::error::BreakerError;

/// Consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// How long the circuit stays open before admitting a probe.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Circuit state.
#[derive(Debug, Clone)]
enum BreakerState {
    /// Normal operation. Tracks consecutive failures toward the threshold.
    Closed { consecutive_failures: u32 },
    /// Rejecting fast. Admits a probe once `open_timeout` has elapsed.
    Open { opened_at: Instant },
    /// A single probe is in flight; everyone else is rejected.
    HalfOpen,
}

/// Fail-fast guard around a flaky dependency.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            open_timeout,
            state: Mutex::new(BreakerState::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Run `op` through the breaker.
    ///
    /// Rejects with [`BreakerError::Open`] without invoking `op` when the
    /// circuit is open (or a half-open probe is already running).
    pub async fn call<T, E, F>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.try_acquire() {
            return Err(BreakerError::Open);
        }
        match op.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(BreakerError::Inner(err))
            }
        }
    }

    /// Whether a call may proceed right now.
    ///
    /// Transitions Open -> HalfOpen once the open timeout has elapsed;
    /// the caller that observes that transition becomes the single
    /// admitted probe. The caller MUST follow up with `record_success`
    /// or `record_failure`.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock_state();
        match *state {
            BreakerState::Closed { .. } => true,
            BreakerState::Open { opened_at } => {
                if opened_at.elapsed() >= self.open_timeout {
                    *state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    /// Record a successful call. Closes the circuit and resets the
    /// failure counter.
    pub fn record_success(&self) {
        let mut state = self.lock_state();
        *state = BreakerState::Closed {
            consecutive_failures: 0,
        };
    }

    /// Record a failed call. Opens the circuit at the threshold, and
    /// re-opens it (with a fresh timestamp) when a probe fails.
    pub fn record_failure(&self) {
        let mut state = self.lock_state();
        match *state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let count = consecutive_failures + 1;
                if count >= self.failure_threshold {
                    warn!(failures = count, "circuit breaker opened");
                    *state = BreakerState::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    *state = BreakerState::Closed {
                        consecutive_failures: count,
                    };
                }
            }
            BreakerState::HalfOpen => {
                warn!("circuit breaker probe failed, re-opening");
                *state = BreakerState::Open {
                    opened_at: Instant::now(),
                };
            }
            BreakerState::Open { .. } => {}
        }
    }

    /// Current state label, for logs and status surfaces.
    pub fn state_label(&self) -> &'static str {
        match *self.lock_state() {
            BreakerState::Closed { .. } => "closed",
            BreakerState::Open { .. } => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT)
    }
}
