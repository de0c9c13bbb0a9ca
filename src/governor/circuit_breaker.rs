//! # Circuit Breaker
//!
//! Per-handler failure guard with the classic three states:
//!
//! - **Closed**: requests pass; consecutive failures are counted, and
//!   reaching the threshold opens the circuit.
//! - **Open**: requests are rejected without touching the handler until
//!   the recovery timeout elapses; the next admit then becomes the probe
//!   and moves the breaker to half-open.
//! - **HalfOpen**: exactly one probe is outstanding; further admits are
//!   rejected. The probe's success closes the circuit and resets the
//!   count, its failure re-opens with a fresh open time.
//!
//! Breakers are scoped per handler (see DESIGN.md): a bank keyed by
//! handler id hands out one breaker per handler so a failing handler
//! cannot trip its neighbors.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::core::config::CircuitBreakerConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::HandlerId;

/// Breaker state, carrying the data each state needs.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation; counts consecutive failures
    Closed { failure_count: u32 },
    /// Rejecting; remembers when the circuit opened
    Open { opened_at: Instant },
    /// A single recovery probe is in flight
    HalfOpen,
}

/// Serializable label for listings and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitStateLabel {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn label(&self) -> CircuitStateLabel {
        match self {
            CircuitState::Closed { .. } => CircuitStateLabel::Closed,
            CircuitState::Open { .. } => CircuitStateLabel::Open,
            CircuitState::HalfOpen => CircuitStateLabel::HalfOpen,
        }
    }
}

/// One handler's failure-state machine.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<CircuitState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Mutex::new(CircuitState::Closed { failure_count: 0 }),
            config,
        }
    }

    /// Whether a request may pass right now.
    ///
    /// In the open state this is also where the open→half-open transition
    /// happens: once the recovery timeout has elapsed, the current call is
    /// admitted as the probe.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { .. } => true,
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() > self.config.recovery_timeout {
                    *state = CircuitState::HalfOpen;
                    info!("circuit half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
            // The probe is already out; reject until it reports back.
            CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if matches!(*state, CircuitState::HalfOpen) {
            *state = CircuitState::Closed { failure_count: 0 };
            info!("circuit closed after successful probe");
        }
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            CircuitState::Closed { failure_count } => {
                let failure_count = failure_count + 1;
                if failure_count >= self.config.failure_threshold {
                    warn!(failure_count, "failure threshold reached, circuit open");
                    *state = CircuitState::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    *state = CircuitState::Closed { failure_count };
                }
            }
            CircuitState::Open { .. } => {}
            CircuitState::HalfOpen => {
                warn!("probe failed, circuit re-opened");
                *state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().clone()
    }
}

/// One breaker per handler, created on first use.
#[derive(Debug)]
pub struct BreakerBank {
    breakers: DashMap<HandlerId, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl BreakerBank {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    fn breaker(&self, handler_id: HandlerId) -> Arc<CircuitBreaker> {
        Arc::clone(
            &self
                .breakers
                .entry(handler_id)
                .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone()))),
        )
    }

    /// Admission check for the governor chain.
    pub fn check(&self, handler_id: HandlerId) -> GatewayResult<()> {
        if self.breaker(handler_id).try_acquire() {
            Ok(())
        } else {
            Err(GatewayError::CircuitOpen { handler_id })
        }
    }

    pub fn record_success(&self, handler_id: HandlerId) {
        self.breaker(handler_id).record_success();
    }

    pub fn record_failure(&self, handler_id: HandlerId) {
        self.breaker(handler_id).record_failure();
    }

    /// Current state label for a handler, `Closed` if never consulted.
    pub fn state_of(&self, handler_id: HandlerId) -> CircuitStateLabel {
        self.breakers
            .get(&handler_id)
            .map(|b| b.state().label())
            .unwrap_or(CircuitStateLabel::Closed)
    }

    /// Drop a handler's breaker once it unregisters.
    pub fn forget(&self, handler_id: HandlerId) {
        self.breakers.remove(&handler_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            recovery_timeout: recovery,
        })
    }

    #[test]
    fn test_initial_state_is_closed() {
        let cb = breaker(3, Duration::from_secs(60));
        assert_eq!(cb.state(), CircuitState::Closed { failure_count: 0 });
        assert!(cb.try_acquire());
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let cb = breaker(3, Duration::from_secs(60));

        cb.record_failure();
        cb.record_failure();
        assert!(cb.try_acquire(), "still closed below the threshold");

        cb.record_failure();
        assert!(matches!(cb.state(), CircuitState::Open { .. }));
        assert!(!cb.try_acquire(), "open circuit rejects immediately");
    }

    #[test]
    fn test_success_in_closed_does_not_reset_consecutive_count() {
        let cb = breaker(3, Duration::from_secs(60));
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        // The count tracks failures since the last close, so one more
        // failure still opens the circuit.
        cb.record_failure();
        assert!(matches!(cb.state(), CircuitState::Open { .. }));
    }

    #[test]
    fn test_recovery_probe_closes_on_success() {
        let cb = breaker(2, Duration::from_millis(50));
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.try_acquire());

        std::thread::sleep(Duration::from_millis(70));

        // First call after the timeout is the probe.
        assert!(cb.try_acquire());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        // Only one probe at a time.
        assert!(!cb.try_acquire());

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed { failure_count: 0 });
        assert!(cb.try_acquire());
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = breaker(2, Duration::from_millis(50));
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(70));
        assert!(cb.try_acquire());

        cb.record_failure();
        assert!(matches!(cb.state(), CircuitState::Open { .. }));
        // The open time was refreshed, so rejection resumes immediately.
        assert!(!cb.try_acquire());
    }

    #[test]
    fn test_bank_scopes_breakers_per_handler() {
        let bank = BreakerBank::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        });
        let failing = HandlerId::new();
        let healthy = HandlerId::new();

        bank.record_failure(failing);
        assert!(bank.check(failing).is_err());
        assert!(bank.check(healthy).is_ok());
        assert_eq!(bank.state_of(failing), CircuitStateLabel::Open);
        assert_eq!(bank.state_of(healthy), CircuitStateLabel::Closed);
    }

    #[test]
    fn test_bank_check_reports_circuit_open() {
        let bank = BreakerBank::new(CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        });
        let handler = HandlerId::new();
        bank.record_failure(handler);
        match bank.check(handler).unwrap_err() {
            GatewayError::CircuitOpen { handler_id } => assert_eq!(handler_id, handler),
            other => panic!("unexpected error: {other}"),
        }
    }
}
