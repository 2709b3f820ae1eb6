//! Per-provider sliding-window rate limiter
//!
//! Keeps the timestamps of recent attempts in a window; a deny is
//! non-blocking so the router can move on to the next fallback.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Sliding-window counter: at most `max_requests` per `window`
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    times: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            times: Mutex::new(VecDeque::new()),
        }
    }

    /// Would an attempt be admitted right now?
    pub fn check(&self) -> bool {
        let mut times = self.times.lock().unwrap();
        Self::prune(&mut times, self.window);
        times.len() < self.max_requests
    }

    /// Atomically admit and record an attempt. Returns false without
    /// recording anything when the window is full.
    pub fn try_acquire(&self) -> bool {
        let mut times = self.times.lock().unwrap();
        Self::prune(&mut times, self.window);

        if times.len() >= self.max_requests {
            debug!(in_window = times.len(), "try_acquire: denied");
            return false;
        }

        times.push_back(Instant::now());
        true
    }

    /// Attempts currently inside the window
    pub fn in_window(&self) -> usize {
        let mut times = self.times.lock().unwrap();
        Self::prune(&mut times, self.window);
        times.len()
    }

    fn prune(times: &mut VecDeque<Instant>, window: Duration) {
        let cutoff = Instant::now() - window;
        while times.front().map(|t| *t < cutoff).unwrap_or(false) {
            times.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_admits_up_to_max() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.in_window(), 3);
    }

    #[test]
    fn test_deny_does_not_record() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.in_window(), 1);
    }

    #[test]
    fn test_window_expiry_readmits() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));

        assert!(limiter.try_acquire());
        assert!(!limiter.check());

        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check());
        assert!(limiter.try_acquire());
    }

    proptest! {
        // Within one window, recorded attempts never exceed the cap no matter
        // how many acquisitions are attempted.
        #[test]
        fn prop_window_never_overflows(attempts in 1usize..200, max in 1usize..20) {
            let limiter = RateLimiter::new(max, Duration::from_secs(60));
            for _ in 0..attempts {
                limiter.try_acquire();
            }
            prop_assert!(limiter.in_window() <= max);
        }
    }
}
