//! # portshare
//!
//! Share one listening endpoint across several independently-built
//! request handlers. An inbound request is matched by path prefix to a
//! registered handler, handed across a bounded queue to that handler's
//! own poll loop, and the response is correlated back to the original
//! caller by request id. A performance governor — sliding-window rate
//! limits, per-handler circuit breakers, a connection gate, and a
//! metrics monitor — decides whether a request may enter the pipeline at
//! all.
//!
//! ## Quick tour
//!
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use axum::http::StatusCode;
//! use portshare::{
//!     GatewayConfig, GatewayResult, GatewayServer, Handler, RequestEnvelope,
//!     ResponseEnvelope,
//! };
//!
//! struct HelloHandler;
//!
//! #[async_trait]
//! impl Handler for HelloHandler {
//!     async fn handle(&self, request: RequestEnvelope) -> GatewayResult<ResponseEnvelope> {
//!         Ok(request.reply_with(StatusCode::OK, "hello"))
//!     }
//! }
//!
//! # async fn run() -> GatewayResult<()> {
//! let server = GatewayServer::new(GatewayConfig::default())?;
//! let context = server.context();
//! let id = context.register_handler("/hello", Arc::new(HelloHandler))?;
//! context.start_handler(id)?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! server.serve(listener).await
//! # }
//! ```

/// Error types, envelopes, configuration, and the bounded queue
pub mod core;

/// Prefix-keyed handler table owning the per-handler queue pairs
pub mod registry;

/// Admission and metrics policies behind one governor API
pub mod governor;

/// The dispatch pipeline: route, admit, enqueue, correlate, record
pub mod dispatch;

/// Per-handler poll loops bridging handlers onto their queues
pub mod adapter;

/// The HTTP front door and the context object that wires it all up
pub mod gateway;

pub use adapter::HandlerAdapter;
pub use crate::core::config::{CircuitBreakerConfig, GatewayConfig, GovernorConfig, QueueConfig};
pub use crate::core::error::{GatewayError, GatewayResult, LimitScope};
pub use crate::core::types::{Handler, HandlerId, HandlerInfo, RequestEnvelope, ResponseEnvelope};
pub use dispatch::Dispatcher;
pub use gateway::{GatewayContext, GatewayServer};
pub use governor::{PerformanceGovernor, StatsReport, StatsSummary};
pub use registry::HandlerRegistry;
