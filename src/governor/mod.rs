//! # Performance Governor
//!
//! Composes the four admission/record policies — connection gate, rate
//! limiter, circuit breaker, monitor — behind one API. Every sub-policy
//! is individually toggleable; a disabled policy admits everything and
//! records nothing.
//!
//! Admission runs the checks in a fixed order, failing fast on the first
//! refusal: connection gate, then rate limiter, then circuit breaker.
//! Cheap rejections therefore never touch a queue, and a refused request
//! never leaves a timestamp in a rate window it did not pass.

pub mod admission;
pub mod circuit_breaker;
pub mod monitor;
pub mod rate_limit;

use std::time::Duration;
use tracing::debug;

use crate::core::config::GovernorConfig;
use crate::core::error::GatewayResult;
use crate::core::types::HandlerId;

pub use admission::{ConnectionGate, ConnectionSlot};
pub use circuit_breaker::{BreakerBank, CircuitBreaker, CircuitState, CircuitStateLabel};
pub use monitor::{MetricRecord, RequestMonitor, StatsReport, StatsSummary, TotalCounters};
pub use rate_limit::RateLimiter;

/// Proof that a request was admitted.
///
/// Holds the connection slot (when the gate is enabled) for the lifetime
/// of the dispatch call; dropping the permit releases the slot on every
/// exit path.
#[derive(Debug)]
pub struct AdmissionPermit {
    _slot: Option<ConnectionSlot>,
}

/// The single admission/record surface the dispatcher talks to.
#[derive(Debug)]
pub struct PerformanceGovernor {
    gate: Option<ConnectionGate>,
    limiter: Option<RateLimiter>,
    breakers: Option<BreakerBank>,
    monitor: Option<RequestMonitor>,
}

impl PerformanceGovernor {
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            gate: config
                .enable_connection_gate
                .then(|| ConnectionGate::new(config.max_connections)),
            limiter: config.enable_rate_limiting.then(|| {
                RateLimiter::new(config.max_requests_per_second, config.max_requests_per_handler)
            }),
            breakers: config
                .enable_circuit_breaker
                .then(|| BreakerBank::new(config.circuit_breaker.clone())),
            monitor: config
                .enable_monitoring
                .then(|| RequestMonitor::new(config.monitor_capacity)),
        }
    }

    /// Decide whether a request for `handler_id` may enter the pipeline.
    ///
    /// Checks run gate → limiter → breaker; the first refusal wins and is
    /// returned as the error the dispatcher folds into a 429/503.
    pub fn admit(&self, handler_id: HandlerId) -> GatewayResult<AdmissionPermit> {
        let slot = match &self.gate {
            Some(gate) => Some(gate.try_acquire()?),
            None => None,
        };
        if let Some(limiter) = &self.limiter {
            limiter.check(handler_id)?;
        }
        if let Some(breakers) = &self.breakers {
            breakers.check(handler_id)?;
        }
        debug!(%handler_id, "request admitted");
        Ok(AdmissionPermit { _slot: slot })
    }

    /// Record one completed (or rejected) outcome.
    ///
    /// Feeds the monitor unconditionally; a status of 400 or above counts
    /// as a failure toward the handler's breaker, anything else as a
    /// success.
    pub fn record(&self, handler_id: HandlerId, duration: Duration, status: u16) {
        if let Some(monitor) = &self.monitor {
            monitor.record(handler_id, duration, status);
        }
        if let Some(breakers) = &self.breakers {
            if status >= 400 {
                breakers.record_failure(handler_id);
            } else {
                breakers.record_success(handler_id);
            }
        }
    }

    /// Stats over the monitor buffer; no-data when monitoring is off.
    pub fn stats(&self, handler_id: Option<HandlerId>) -> StatsReport {
        match &self.monitor {
            Some(monitor) => monitor.stats(handler_id),
            None => StatsReport::NoData {
                message: "monitoring disabled".to_string(),
            },
        }
    }

    /// Drop all per-handler governor state for an unregistered handler.
    pub fn forget(&self, handler_id: HandlerId) {
        if let Some(limiter) = &self.limiter {
            limiter.forget(handler_id);
        }
        if let Some(breakers) = &self.breakers {
            breakers.forget(handler_id);
        }
    }

    pub fn monitor(&self) -> Option<&RequestMonitor> {
        self.monitor.as_ref()
    }

    pub fn breakers(&self) -> Option<&BreakerBank> {
        self.breakers.as_ref()
    }
}
