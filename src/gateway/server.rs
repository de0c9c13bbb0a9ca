//! # Gateway HTTP Server
//!
//! The front door. Operational endpoints live under `/_gateway/` and
//! every other request falls through to the dispatcher:
//!
//! - `GET /_gateway/health` — status plus registered/active counts
//! - `GET /_gateway/handlers` — all registrations
//! - `GET /_gateway/stats[?handler_id=X]` — monitor statistics
//! - anything else, any method — prefix-routed dispatch
//!
//! The raw connection handling belongs to axum/hyper; this module only
//! turns the accepted request into a [`RequestEnvelope`] and the
//! dispatcher's envelope back into an HTTP response.

use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::core::config::GatewayConfig;
use crate::core::error::GatewayResult;
use crate::core::types::{HandlerId, RequestEnvelope};
use crate::gateway::context::GatewayContext;

/// The serving surface around one [`GatewayContext`].
#[derive(Debug, Clone)]
pub struct GatewayServer {
    context: Arc<GatewayContext>,
}

impl GatewayServer {
    /// Build a server and its context from a configuration.
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        Ok(Self {
            context: GatewayContext::new(config)?,
        })
    }

    /// Wrap an existing context.
    pub fn from_context(context: Arc<GatewayContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> Arc<GatewayContext> {
        Arc::clone(&self.context)
    }

    /// The complete router: operational endpoints plus dispatch fallback.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/_gateway/health", get(health))
            .route("/_gateway/handlers", get(list_handlers))
            .route("/_gateway/stats", get(stats))
            .fallback(dispatch)
            .with_state(Arc::clone(&self.context))
    }

    /// Serve the router on an already-bound listener until the process
    /// is shut down.
    pub async fn serve(self, listener: TcpListener) -> GatewayResult<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "gateway listening");
        let app = self
            .router()
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
        axum::serve(listener, app).await?;
        Ok(())
    }
}

async fn health(State(context): State<Arc<GatewayContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "registered_count": context.registry().registered_count(),
        "active_count": context.registry().active_count(),
    }))
}

async fn list_handlers(State(context): State<Arc<GatewayContext>>) -> impl IntoResponse {
    Json(context.registry().snapshot())
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    handler_id: Option<HandlerId>,
}

async fn stats(
    State(context): State<Arc<GatewayContext>>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    Json(context.stats(query.handler_id))
}

/// Fallback for every non-operational request, all methods.
async fn dispatch(State(context): State<Arc<GatewayContext>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return (StatusCode::BAD_REQUEST, format!("unreadable body: {err}"))
                .into_response()
        }
    };

    let envelope = RequestEnvelope::new(
        parts.method,
        parts.uri.path(),
        parts.uri.query().map(str::to_string),
        parts.headers,
        body,
    );
    context.dispatch(envelope).await.into_http()
}
