//! Circuit breaker for oracle rate limit protection
//!
//! Repeated oracle failures trip the breaker, which then rejects calls
//! immediately until a cooldown elapses. One probe call is allowed after the
//! cooldown to test recovery.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests allowed
    Closed,
    /// Too many failures - reject requests immediately
    Open,
    /// Cooldown elapsed - allow one probe request
    HalfOpen,
}

/// Circuit breaker tracking consecutive oracle failures
///
/// # Example
///
/// ```
/// use ruleflow_oracle::CircuitBreaker;
///
/// let cb = CircuitBreaker::default();
/// cb.record_failure();
/// cb.record_failure();
/// cb.record_failure();
/// assert!(!cb.can_execute());
/// ```
pub struct CircuitBreaker {
    failure_count: AtomicU32,
    last_failure: AtomicU64, // Unix timestamp millis
    trip_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// `trip_threshold` consecutive failures open the circuit;
    /// `cooldown_secs` is the wait before a recovery probe is allowed.
    pub fn new(trip_threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            failure_count: AtomicU32::new(0),
            last_failure: AtomicU64::new(0),
            trip_threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        if self.failure_count.load(Ordering::Relaxed) < self.trip_threshold {
            return CircuitState::Closed;
        }

        let elapsed = now_millis().saturating_sub(self.last_failure.load(Ordering::Relaxed));
        if elapsed >= self.cooldown.as_millis() as u64 {
            CircuitState::HalfOpen
        } else {
            CircuitState::Open
        }
    }

    /// Record a successful call (resets the failure count)
    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.last_failure.store(now_millis(), Ordering::Relaxed);
    }

    /// Whether a call may proceed (closed or half-open)
    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// Current failure count (for logging)
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Milliseconds until a probe is allowed; 0 unless open
    pub fn time_until_retry(&self) -> u64 {
        if self.state() != CircuitState::Open {
            return 0;
        }
        let elapsed = now_millis().saturating_sub(self.last_failure.load(Ordering::Relaxed));
        (self.cooldown.as_millis() as u64).saturating_sub(elapsed)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        // Conservative defaults: 3 failures, 60 second cooldown
        Self::new(3, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_initial_state_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new(3, 60);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::new(3, 60);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let cb = CircuitBreaker::new(2, 1);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        sleep(Duration::from_millis(1100));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_execute());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_time_until_retry() {
        let cb = CircuitBreaker::new(2, 2);

        cb.record_failure();
        cb.record_failure();

        let remaining = cb.time_until_retry();
        assert!(remaining > 0);
        assert!(remaining <= 2000);
    }
}
