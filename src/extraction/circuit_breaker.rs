//! # Circuit Breaker Module
//!
//! Fail-fast guard for the networked extraction service. After repeated
//! consecutive failures the breaker opens and calls are rejected without
//! touching the network until the reset window elapses.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::RecoveryConfig;

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through
    Closed,
    /// Threshold reached, requests fail fast
    Open,
    /// Reset window elapsed, the next request probes the service
    HalfOpen,
}

/// Circuit breaker around a remote capability
///
/// - `circuit_breaker_threshold`: consecutive failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: time before a probe is allowed (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_count: Mutex<u32>,
    last_failure_time: Mutex<Option<Instant>>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            failure_count: Mutex::new(0),
            last_failure_time: Mutex::new(None),
            config,
        }
    }

    /// Current state, without side effects
    pub fn state(&self) -> CircuitState {
        let failure_count = *self.failure_count.lock().unwrap();
        let last_failure = *self.last_failure_time.lock().unwrap();

        if failure_count < self.config.circuit_breaker_threshold {
            return CircuitState::Closed;
        }
        match last_failure {
            Some(last_time) if last_time.elapsed() < self.reset_window() => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    /// Check if the breaker is open (blocking requests)
    ///
    /// Once the reset window has elapsed the failure count is cleared and the
    /// next request is let through.
    pub fn is_open(&self) -> bool {
        match self.state() {
            CircuitState::Open => true,
            CircuitState::HalfOpen => {
                info!("Circuit breaker reset window elapsed, allowing a probe request");
                self.record_success();
                false
            }
            CircuitState::Closed => false,
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut failure_count = self.failure_count.lock().unwrap();
        *failure_count += 1;
        *self.last_failure_time.lock().unwrap() = Some(Instant::now());

        if *failure_count == self.config.circuit_breaker_threshold {
            warn!(
                "Circuit breaker opened after {} consecutive failures",
                *failure_count
            );
        }
    }

    /// Record a successful call, closing the breaker
    pub fn record_success(&self) {
        *self.failure_count.lock().unwrap() = 0;
        *self.last_failure_time.lock().unwrap() = None;
    }

    pub fn failure_count(&self) -> u32 {
        *self.failure_count.lock().unwrap()
    }

    fn reset_window(&self) -> Duration {
        Duration::from_secs(self.config.circuit_breaker_reset_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(RecoveryConfig {
            circuit_breaker_threshold: threshold,
            circuit_breaker_reset_secs: reset_secs,
            ..RecoveryConfig::default()
        })
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = breaker(2, 60);
        assert!(!breaker.is_open());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_closes() {
        let breaker = breaker(1, 60);
        breaker.record_failure();
        assert!(breaker.is_open());

        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_half_open_after_reset_window() {
        let breaker = breaker(1, 0);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(!breaker.is_open());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
