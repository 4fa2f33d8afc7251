//! Circuit breaker for the object-store endpoint: after a
//! consecutive-failure threshold, short-circuit further calls for a timeout
//! and let a single probe attempt recovery.

use std::sync::atomic::{AtomicU32, AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    open_timeout: Duration,
    consecutive_failures: AtomicU32,
    opened_since: RwLock<Option<Instant>>,
    probe_in_flight: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            open_timeout,
            consecutive_failures: AtomicU32::new(0),
            opened_since: RwLock::new(None),
            probe_in_flight: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> CircuitState {
        match *self.opened_since.read().unwrap() {
            None => CircuitState::Closed,
            Some(at) if at.elapsed() >= self.open_timeout => CircuitState::HalfOpen,
            Some(_) => CircuitState::Open,
        }
    }

    /// Call before attempting the guarded operation. Returns `true` if the
    /// call should proceed (closed, or this is the single half-open probe).
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !self.probe_in_flight.swap(true, Ordering::SeqCst),
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.probe_in_flight.store(false, Ordering::SeqCst);
        *self.opened_since.write().unwrap() = None;
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe_in_flight.store(false, Ordering::SeqCst);
        if failures >= self.failure_threshold {
            *self.opened_since.write().unwrap() = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        assert!(breaker.allow_request());
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_allows_single_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.allow_request());
        assert!(!breaker.allow_request());
    }
}
