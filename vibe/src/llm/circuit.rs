//! Per-provider circuit breaker
//!
//! Closed counts failures; reaching the threshold opens the circuit. Open
//! refuses everything until the reset timeout elapses, then half-open admits
//! exactly one probe: success closes, failure re-opens for another interval.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker with closed/open/half-open hysteresis
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a breaker
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state, accounting for reset-timeout expiry
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock().unwrap();
        self.roll_over(&mut inner);
        inner.state
    }

    /// Consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failures
    }

    /// Ask to dispatch. Closed admits freely; open refuses; half-open admits
    /// a single probe at a time.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.roll_over(&mut inner);

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    debug!("try_acquire: admitting half-open probe");
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful dispatch
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            debug!("record_success: probe succeeded, closing circuit");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Record a failed dispatch
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::HalfOpen => {
                warn!("record_failure: probe failed, re-opening circuit");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    warn!(failures = inner.failures, "record_failure: threshold reached, opening circuit");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {
                inner.failures += 1;
            }
        }
    }

    /// Administrative reset to closed
    pub fn reset(&self) {
        debug!("reset: called");
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    /// Open → HalfOpen once the reset timeout has elapsed
    fn roll_over(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && let Some(opened) = inner.opened_at
            && opened.elapsed() >= self.reset_timeout
        {
            debug!("roll_over: reset timeout elapsed, half-open");
            inner.state = CircuitState::HalfOpen;
            inner.probe_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));

        breaker.record_failure();
        // Zero reset timeout: immediately half-open
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(breaker.try_acquire());
        // Second caller must wait for the probe to resolve
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_probe_success_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();

        assert!(breaker.try_acquire());
        breaker.record_success();

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Not yet past the reset timeout: still refusing
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_reopen_after_failed_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();

        assert!(breaker.try_acquire());
        breaker.record_failure();

        // Zero timeout rolls straight back to half-open; a fresh probe is allowed
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_reset_clears_everything() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure();
        assert!(!breaker.try_acquire());

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire());
    }
}
