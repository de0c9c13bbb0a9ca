//! # Configuration Module
//!
//! Every tunable the gateway exposes, as serde-derived structs with
//! defaults. Supports YAML files and `PORTSHARE_*` environment overrides;
//! `validate()` rejects configurations that would make the pipeline
//! degenerate (zero-capacity queues, a breaker that opens on zero
//! failures, and so on).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::error::{GatewayError, GatewayResult};

/// Per-handler queue and dispatch timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of each handler's request queue
    pub request_queue_capacity: usize,

    /// Capacity of each handler's response queue
    pub response_queue_capacity: usize,

    /// How long a dispatch call waits for a slot in a full request queue
    #[serde(with = "humantime_serde")]
    pub enqueue_timeout: Duration,

    /// How long a dispatch call waits for the correlated response
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,

    /// Adapter poll-loop dequeue wait; bounds how fast a stop is observed
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// How long `stop_handler` waits for a poll loop to exit before
    /// aborting the task
    #[serde(with = "humantime_serde")]
    pub stop_join_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            request_queue_capacity: 1000,
            response_queue_capacity: 1000,
            enqueue_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            stop_join_timeout: Duration::from_secs(5),
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,

    /// How long an open breaker rejects before probing recovery
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Admission and metrics policy configuration.
///
/// Each sub-policy can be disabled independently; a disabled policy admits
/// everything and records nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Record completed requests into the metrics ring
    pub enable_monitoring: bool,

    /// Enforce the sliding-window rate limits
    pub enable_rate_limiting: bool,

    /// Enforce the bounded concurrent-connection gate
    pub enable_connection_gate: bool,

    /// Enforce per-handler circuit breaking
    pub enable_circuit_breaker: bool,

    /// Gateway-wide admitted requests per trailing second
    pub max_requests_per_second: usize,

    /// Per-handler admitted requests per trailing second
    pub max_requests_per_handler: usize,

    /// Concurrent dispatches admitted past the connection gate
    pub max_connections: usize,

    /// Concurrently running handler poll loops
    pub max_poll_workers: usize,

    /// Metric records kept in the ring buffer
    pub monitor_capacity: usize,

    /// Circuit breaker tuning
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            enable_monitoring: true,
            enable_rate_limiting: true,
            enable_connection_gate: true,
            enable_circuit_breaker: true,
            max_requests_per_second: 100,
            max_requests_per_handler: 50,
            max_connections: 100,
            max_poll_workers: 50,
            monitor_capacity: 1000,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub queues: QueueConfig,
    pub governor: GovernorConfig,
}

impl GatewayConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> GatewayResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Defaults with `PORTSHARE_*` environment overrides applied.
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides onto this configuration in place.
    pub fn apply_env(&mut self) -> GatewayResult<()> {
        if let Some(v) = env_parse::<usize>("PORTSHARE_MAX_REQUESTS_PER_SECOND")? {
            self.governor.max_requests_per_second = v;
        }
        if let Some(v) = env_parse::<usize>("PORTSHARE_MAX_REQUESTS_PER_HANDLER")? {
            self.governor.max_requests_per_handler = v;
        }
        if let Some(v) = env_parse::<usize>("PORTSHARE_MAX_CONNECTIONS")? {
            self.governor.max_connections = v;
        }
        if let Some(v) = env_parse::<usize>("PORTSHARE_MAX_POLL_WORKERS")? {
            self.governor.max_poll_workers = v;
        }
        if let Some(v) = env_parse::<usize>("PORTSHARE_REQUEST_QUEUE_SIZE")? {
            self.queues.request_queue_capacity = v;
        }
        if let Some(v) = env_parse::<usize>("PORTSHARE_RESPONSE_QUEUE_SIZE")? {
            self.queues.response_queue_capacity = v;
        }
        if let Some(v) = env_parse::<u32>("PORTSHARE_CB_FAILURE_THRESHOLD")? {
            self.governor.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("PORTSHARE_CB_RECOVERY_TIMEOUT_SECS")? {
            self.governor.circuit_breaker.recovery_timeout = Duration::from_secs(v);
        }
        Ok(())
    }

    /// Reject configurations that would make the pipeline degenerate.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.queues.request_queue_capacity == 0 {
            return Err(GatewayError::config("request_queue_capacity must be > 0"));
        }
        if self.queues.response_queue_capacity == 0 {
            return Err(GatewayError::config("response_queue_capacity must be > 0"));
        }
        if self.governor.enable_rate_limiting {
            if self.governor.max_requests_per_second == 0 {
                return Err(GatewayError::config("max_requests_per_second must be > 0"));
            }
            if self.governor.max_requests_per_handler == 0 {
                return Err(GatewayError::config("max_requests_per_handler must be > 0"));
            }
        }
        if self.governor.enable_connection_gate && self.governor.max_connections == 0 {
            return Err(GatewayError::config("max_connections must be > 0"));
        }
        if self.governor.max_poll_workers == 0 {
            return Err(GatewayError::config("max_poll_workers must be > 0"));
        }
        if self.governor.enable_circuit_breaker
            && self.governor.circuit_breaker.failure_threshold == 0
        {
            return Err(GatewayError::config(
                "circuit_breaker.failure_threshold must be > 0",
            ));
        }
        if self.governor.enable_monitoring && self.governor.monitor_capacity == 0 {
            return Err(GatewayError::config("monitor_capacity must be > 0"));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> GatewayResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            GatewayError::config(format!("invalid value for {name}: {raw:?}"))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.queues.request_queue_capacity, 1000);
        assert_eq!(config.queues.response_queue_capacity, 1000);
        assert_eq!(config.queues.enqueue_timeout, Duration::from_secs(5));
        assert_eq!(config.queues.response_timeout, Duration::from_secs(30));
        assert_eq!(config.queues.poll_interval, Duration::from_secs(1));
        assert_eq!(config.governor.max_requests_per_second, 100);
        assert_eq!(config.governor.max_requests_per_handler, 50);
        assert_eq!(config.governor.max_connections, 100);
        assert_eq!(config.governor.max_poll_workers, 50);
        assert_eq!(config.governor.monitor_capacity, 1000);
        assert_eq!(config.governor.circuit_breaker.failure_threshold, 5);
        assert_eq!(
            config.governor.circuit_breaker.recovery_timeout,
            Duration::from_secs(60)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
queues:
  request_queue_capacity: 10
  enqueue_timeout: 250ms
governor:
  max_requests_per_second: 5
  enable_circuit_breaker: false
"#;
        let config = GatewayConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.queues.request_queue_capacity, 10);
        assert_eq!(config.queues.enqueue_timeout, Duration::from_millis(250));
        // Unspecified fields keep their defaults.
        assert_eq!(config.queues.response_queue_capacity, 1000);
        assert_eq!(config.governor.max_requests_per_second, 5);
        assert!(!config.governor.enable_circuit_breaker);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = GatewayConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = GatewayConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            parsed.governor.max_requests_per_second,
            config.governor.max_requests_per_second
        );
        assert_eq!(parsed.queues.response_timeout, config.queues.response_timeout);
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        let mut config = GatewayConfig::default();
        config.queues.request_queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.governor.max_requests_per_second = 0;
        assert!(config.validate().is_err());

        // A zero ceiling is fine once the policy is off.
        config.governor.enable_rate_limiting = false;
        assert!(config.validate().is_ok());

        let mut config = GatewayConfig::default();
        config.governor.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    // Environment is process-global, so both env cases live in one test
    // to keep them from racing under the parallel test runner.
    #[test]
    fn test_env_overrides() {
        std::env::set_var("PORTSHARE_MAX_CONNECTIONS", "7");
        let config = GatewayConfig::from_env().unwrap();
        std::env::remove_var("PORTSHARE_MAX_CONNECTIONS");
        assert_eq!(config.governor.max_connections, 7);

        std::env::set_var("PORTSHARE_CB_FAILURE_THRESHOLD", "many");
        let result = GatewayConfig::from_env();
        std::env::remove_var("PORTSHARE_CB_FAILURE_THRESHOLD");
        assert!(result.is_err());
    }
}
