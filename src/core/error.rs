//! # Error Handling Module
//!
//! Defines every failure class the gateway can produce, with HTTP status
//! mappings for the dispatch boundary. Failures detected anywhere on the
//! dispatch path are converted into well-formed responses here — no error
//! is allowed to propagate past the dispatcher and take a serving task down.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::core::types::HandlerId;

/// Result type used throughout the gateway.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// The scope at which a rate limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// The gateway-wide requests-per-second ceiling.
    Global,
    /// A single handler's requests-per-second ceiling.
    Handler,
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitScope::Global => write!(f, "global"),
            LimitScope::Handler => write!(f, "handler"),
        }
    }
}

/// All error conditions produced by the gateway.
///
/// Each variant carries the context needed to log the failure and to pick
/// the HTTP status returned to the caller.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// No registered prefix matches the request path
    #[error("no handler registered for path: {path}")]
    RouteNotFound { path: String },

    /// The sliding-window rate limiter rejected the request
    #[error("rate limit exceeded ({scope} window)")]
    RateLimited { scope: LimitScope },

    /// The handler's circuit breaker is open
    #[error("circuit breaker open for handler {handler_id}")]
    CircuitOpen { handler_id: HandlerId },

    /// The connection gate is at capacity
    #[error("connection limit reached ({max} concurrent)")]
    ConnectionsExhausted { max: usize },

    /// The handler's request queue stayed full past the enqueue timeout
    #[error("request queue full for handler {handler_id}")]
    RequestQueueFull { handler_id: HandlerId },

    /// No response arrived within the response-wait timeout
    #[error("no response from handler {handler_id} within {timeout:?}")]
    ResponseTimeout {
        handler_id: HandlerId,
        timeout: Duration,
    },

    /// A dequeued response carried a different correlation id than the
    /// request that was sent — protocol invariant violated
    #[error("response correlation mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch { expected: Uuid, actual: Uuid },

    /// The handler itself failed while processing a request
    #[error("handler fault: {detail}")]
    HandlerFault { detail: String },

    /// Registration failures (duplicate prefix, unknown handler id, etc.)
    #[error("registration error: {message}")]
    Registration { message: String },

    /// A handler's poll loop could not be started
    #[error("startup error: {message}")]
    Startup { message: String },

    /// Configuration errors (invalid values, unreadable files)
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors from the serving surface or config loading
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl GatewayError {
    /// Create a route-not-found error for the given path
    pub fn route_not_found<S: Into<String>>(path: S) -> Self {
        Self::RouteNotFound { path: path.into() }
    }

    /// Create a handler fault with the given detail text
    pub fn handler_fault<S: Into<String>>(detail: S) -> Self {
        Self::HandlerFault {
            detail: detail.into(),
        }
    }

    /// Create a registration error with a custom message
    pub fn registration<S: Into<String>>(message: S) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// Create a startup error with a custom message
    pub fn startup<S: Into<String>>(message: S) -> Self {
        Self::Startup {
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// The HTTP status a caller sees for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConnectionsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestQueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ResponseTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::CorrelationMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::HandlerFault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Registration { .. } => StatusCode::CONFLICT,
            Self::Startup { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable string tag for JSON error bodies and logs.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "route_not_found",
            Self::RateLimited { .. } => "rate_limited",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::ConnectionsExhausted { .. } => "connections_exhausted",
            Self::RequestQueueFull { .. } => "request_queue_full",
            Self::ResponseTimeout { .. } => "response_timeout",
            Self::CorrelationMismatch { .. } => "correlation_mismatch",
            Self::HandlerFault { .. } => "handler_fault",
            Self::Registration { .. } => "registration_error",
            Self::Startup { .. } => "startup_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }

    /// Whether this error's status counts as a failure in recorded metrics.
    pub fn is_failure_status(&self) -> bool {
        self.status_code().as_u16() >= 400
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for GatewayError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Convert errors into structured HTTP responses for the operational
/// endpoints. Dispatch-path errors do not go through this impl; the
/// dispatcher folds them into `ResponseEnvelope`s so they can be recorded
/// against the owning handler first.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "type": self.error_type(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            GatewayError::route_not_found("/nope").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::RateLimited {
                scope: LimitScope::Global
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::RequestQueueFull {
                handler_id: HandlerId::new()
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::ResponseTimeout {
                handler_id: HandlerId::new(),
                timeout: Duration::from_secs(30)
            }
            .status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::handler_fault("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_type_tags() {
        assert_eq!(
            GatewayError::CircuitOpen {
                handler_id: HandlerId::new()
            }
            .error_type(),
            "circuit_open"
        );
        assert_eq!(
            GatewayError::ConnectionsExhausted { max: 100 }.error_type(),
            "connections_exhausted"
        );
    }

    #[test]
    fn test_all_dispatch_errors_are_failure_statuses() {
        let id = HandlerId::new();
        let errors = [
            GatewayError::route_not_found("/x"),
            GatewayError::RateLimited {
                scope: LimitScope::Handler,
            },
            GatewayError::CircuitOpen { handler_id: id },
            GatewayError::RequestQueueFull { handler_id: id },
            GatewayError::ResponseTimeout {
                handler_id: id,
                timeout: Duration::from_secs(1),
            },
            GatewayError::handler_fault("x"),
        ];
        for err in errors {
            assert!(err.is_failure_status());
        }
    }
}
