//! # Core Types Module
//!
//! The foundational data structures shared by every gateway component:
//! handler identifiers, the request/response envelopes that cross the
//! per-handler queues, and the [`Handler`] trait concrete handlers
//! implement.
//!
//! Envelopes are immutable once created. A request's `request_id` is the
//! correlation id: the response that answers it must echo the same id, and
//! the dispatcher drops any response that does not.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::core::error::GatewayResult;

/// Opaque unique identifier for a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Generate a fresh handler id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HandlerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A request handed across a handler's request queue.
///
/// Created by the gateway from the raw inbound request; owned by the
/// dispatcher until enqueued, then by the queue until the handler's adapter
/// pops it. The `body` is [`Bytes`] so cloning an envelope never copies the
/// payload.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// Correlation id, unique per dispatch call
    pub request_id: Uuid,
    /// HTTP method
    pub method: Method,
    /// Full request path as received (prefix not stripped)
    pub path: String,
    /// Raw query string, if any
    pub query: Option<String>,
    /// Request headers; duplicate headers keep HTTP multi-value semantics
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
    /// When the envelope was created
    pub received_at: Instant,
}

impl RequestEnvelope {
    /// Create a new envelope with a generated correlation id.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            method,
            path: path.into(),
            query,
            headers,
            body,
            received_at: Instant::now(),
        }
    }

    /// Shorthand for a bodyless GET envelope, mostly useful in tests.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, None, HeaderMap::new(), Bytes::new())
    }

    /// The path seen from inside the handler: the routing prefix stripped,
    /// `/` when the prefix consumed the whole path.
    pub fn path_within(&self, prefix: &str) -> String {
        match self.path.strip_prefix(prefix) {
            Some("") => "/".to_string(),
            Some(rest) => rest.to_string(),
            None => self.path.clone(),
        }
    }

    /// Build a response correlated to this request.
    pub fn reply(&self, status: StatusCode) -> ResponseEnvelope {
        ResponseEnvelope::new(self.request_id, status, HeaderMap::new(), Bytes::new())
    }

    /// Build a correlated response with a body.
    pub fn reply_with(&self, status: StatusCode, body: impl Into<Bytes>) -> ResponseEnvelope {
        ResponseEnvelope::new(self.request_id, status, HeaderMap::new(), body.into())
    }
}

/// A response handed back across a handler's response queue.
///
/// Consumed exactly once, by the dispatch call whose request carries the
/// same `request_id`.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// Must equal the originating request's id
    pub request_id: Uuid,
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl ResponseEnvelope {
    pub fn new(request_id: Uuid, status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            request_id,
            status,
            headers,
            body,
        }
    }

    /// A plain-text response, used for synthetic error envelopes.
    pub fn text(request_id: Uuid, status: StatusCode, text: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            request_id,
            status,
            headers,
            body: Bytes::from(text.into()),
        }
    }

    /// Convert into an HTTP response for the serving surface.
    pub fn into_http(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// The seam between the gateway and an independently-built handler.
///
/// Implementations receive the full envelope (path un-stripped; use
/// [`RequestEnvelope::path_within`] with their registered prefix) and must
/// answer with a response carrying the same correlation id — the
/// [`RequestEnvelope::reply`] helpers keep that invariant visible. A
/// returned `Err` is converted by the adapter into a 500 response whose
/// body is the error text.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: RequestEnvelope) -> GatewayResult<ResponseEnvelope>;
}

/// Listing entry for a registered handler, served by `/_gateway/handlers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerInfo {
    pub handler_id: HandlerId,
    pub prefix: String,
    pub active: bool,
}
