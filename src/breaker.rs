//! Circuit breaker for the external retrieval service.
//!
//! One instance per external dependency, alive for the whole process. Call
//! sites must call [`CircuitBreaker::guard`] before attempting the call and
//! exactly one of [`success`](CircuitBreaker::success) /
//! [`failure`](CircuitBreaker::failure) afterwards. A call rejected by the
//! breaker itself must not be fed back into `failure` — that would
//! double-count a failure the service never saw.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Consecutive failures before the circuit opens.
pub const FAILURE_THRESHOLD: u32 = 5;

/// How long an open circuit stays open before allowing a probe.
pub const RESET_WINDOW: Duration = Duration::from_millis(30_000);

/// Error returned by [`CircuitBreaker::guard`] while the circuit is open.
#[derive(Debug, thiserror::Error)]
#[error("external service unavailable: circuit open")]
pub struct CircuitOpen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    failures: u32,
    last_failure: Option<Instant>,
}

pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
    reset_window: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_settings(FAILURE_THRESHOLD, RESET_WINDOW)
    }

    /// Constructor with explicit threshold and reset window. Production uses
    /// [`new`](Self::new); tests shrink the window to avoid real waits.
    pub fn with_settings(threshold: u32, reset_window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                last_failure: None,
            }),
            threshold,
            reset_window,
        }
    }

    /// Checks whether a call may proceed.
    ///
    /// Open + reset window not elapsed → `Err(CircuitOpen)`. Open + window
    /// elapsed → transitions to half-open and lets this one call through as
    /// the probe. Closed and half-open always pass.
    pub fn guard(&self) -> Result<(), CircuitOpen> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == BreakerState::Open {
            let elapsed = inner
                .last_failure
                .map(|t| t.elapsed())
                .unwrap_or(Duration::MAX);
            if elapsed < self.reset_window {
                return Err(CircuitOpen);
            }
            inner.state = BreakerState::HalfOpen;
        }
        Ok(())
    }

    /// Records a successful call: resets the failure count and closes the
    /// circuit (including a successful half-open probe).
    pub fn success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures = 0;
        inner.state = BreakerState::Closed;
    }

    /// Records a failed call. At the failure threshold the circuit opens and
    /// the failure time starts the reset window.
    pub fn failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures += 1;
        inner.last_failure = Some(Instant::now());
        if inner.failures >= self.threshold && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            warn!(failures = inner.failures, "circuit breaker opened");
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn failures(&self) -> u32 {
        self.inner.lock().unwrap().failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new();
        for _ in 0..FAILURE_THRESHOLD {
            assert!(breaker.guard().is_ok());
            breaker.failure();
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.guard().is_err());
    }

    #[test]
    fn stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new();
        for _ in 0..FAILURE_THRESHOLD - 1 {
            breaker.failure();
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.guard().is_ok());
    }

    #[test]
    fn half_open_probe_after_reset_window() {
        let breaker = CircuitBreaker::with_settings(5, Duration::from_millis(20));
        for _ in 0..5 {
            breaker.failure();
        }
        assert!(breaker.guard().is_err());

        std::thread::sleep(Duration::from_millis(30));
        assert!(breaker.guard().is_ok());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn success_after_probe_closes_and_resets() {
        let breaker = CircuitBreaker::with_settings(5, Duration::from_millis(10));
        for _ in 0..5 {
            breaker.failure();
        }
        std::thread::sleep(Duration::from_millis(20));
        breaker.guard().unwrap();
        breaker.success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.failures(), 0);
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::with_settings(5, Duration::from_millis(10));
        for _ in 0..5 {
            breaker.failure();
        }
        std::thread::sleep(Duration::from_millis(20));
        breaker.guard().unwrap();
        breaker.failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.guard().is_err());
    }
}
