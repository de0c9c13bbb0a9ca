//! # Handler Adapter
//!
//! One adapter per registered handler. The adapter owns the handler's
//! poll loop: dequeue a request with a short bounded wait, invoke the
//! handler, enqueue exactly one response. A handler error becomes a 500
//! response carrying the error text; a full response queue is logged and
//! the response dropped, leaving the waiting dispatch call to hit its own
//! timeout instead of hanging forever.
//!
//! Lifecycle: `serve()` registers the handler (failing on a prefix
//! conflict), marks it active, runs the loop on the calling task until
//! `stop()` cancels it, then deactivates and unregisters. There is no
//! restart — a stopped adapter is done, and re-registering takes a new
//! adapter instance.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::QueueConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{Handler, HandlerId, ResponseEnvelope};
use crate::registry::{HandlerChannels, HandlerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdapterState {
    Created,
    Running,
    Stopped,
}

/// Bridges one handler onto its queue pair.
pub struct HandlerAdapter {
    handler_id: HandlerId,
    prefix: String,
    handler: Arc<dyn Handler>,
    registry: Arc<HandlerRegistry>,
    config: QueueConfig,
    shutdown: CancellationToken,
    state: parking_lot::Mutex<AdapterState>,
}

impl HandlerAdapter {
    pub fn new(
        handler_id: HandlerId,
        prefix: impl Into<String>,
        handler: Arc<dyn Handler>,
        registry: Arc<HandlerRegistry>,
        config: QueueConfig,
    ) -> Self {
        Self {
            handler_id,
            prefix: prefix.into(),
            handler,
            registry,
            config,
            shutdown: CancellationToken::new(),
            state: parking_lot::Mutex::new(AdapterState::Created),
        }
    }

    pub fn handler_id(&self) -> HandlerId {
        self.handler_id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_running(&self) -> bool {
        *self.state.lock() == AdapterState::Running
    }

    /// Register, activate, and poll until stopped; then clean up.
    ///
    /// Blocks the calling task for the adapter's whole lifetime. The
    /// gateway context spawns this; collaborators that own their startup
    /// can call it directly instead.
    pub async fn serve(&self) -> GatewayResult<()> {
        let channels = self.attach()?;
        self.run(channels).await;
        Ok(())
    }

    /// The poll half of `serve()`, split out so the gateway context can
    /// attach synchronously (surfacing registration conflicts to the
    /// `start_handler` caller) and spawn only this part.
    pub(crate) async fn run(&self, channels: Arc<HandlerChannels>) {
        self.poll_loop(&channels).await;
        self.detach();
    }

    /// Register with the routing table and mark active.
    pub(crate) fn attach(&self) -> GatewayResult<Arc<HandlerChannels>> {
        {
            let mut state = self.state.lock();
            match *state {
                AdapterState::Created => *state = AdapterState::Running,
                AdapterState::Running => {
                    return Err(GatewayError::startup(format!(
                        "handler {} is already serving",
                        self.handler_id
                    )))
                }
                AdapterState::Stopped => {
                    return Err(GatewayError::startup(format!(
                        "handler {} was stopped and cannot be restarted",
                        self.handler_id
                    )))
                }
            }
        }

        let channels = match self.registry.register(self.handler_id, &self.prefix) {
            Ok(channels) => channels,
            Err(err) => {
                *self.state.lock() = AdapterState::Stopped;
                return Err(err);
            }
        };
        self.registry.set_active(self.handler_id, true);
        info!(handler_id = %self.handler_id, prefix = %self.prefix, "handler serving");
        Ok(channels)
    }

    /// Deactivate and drop the registration. Idempotent; also called by
    /// the context when a poll loop has to be aborted.
    pub(crate) fn detach(&self) {
        *self.state.lock() = AdapterState::Stopped;
        self.registry.set_active(self.handler_id, false);
        self.registry.unregister(self.handler_id);
        info!(handler_id = %self.handler_id, "handler stopped");
    }

    /// Ask the poll loop to exit. The owning context joins the serving
    /// task afterwards with a bounded wait.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    async fn poll_loop(&self, channels: &HandlerChannels) {
        debug!(handler_id = %self.handler_id, "poll loop started");
        loop {
            let popped = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                popped = channels.requests.pop_timeout(self.config.poll_interval) => popped,
            };
            // A `None` is just the bounded wait expiring; loop around so
            // the cancellation branch stays responsive.
            let Some(request) = popped else { continue };

            let request_id = request.request_id;
            let response = match self.handler.handle(request).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(handler_id = %self.handler_id, %err, "handler fault");
                    ResponseEnvelope::text(
                        request_id,
                        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                        format!("handler fault: {err}"),
                    )
                }
            };

            if channels
                .responses
                .push_timeout(response, self.config.enqueue_timeout)
                .await
                .is_err()
            {
                // The paired dispatch call will hit its response timeout;
                // dropping here is what keeps this loop from wedging.
                error!(
                    handler_id = %self.handler_id,
                    %request_id,
                    "response queue full, dropping response"
                );
            }
        }
        debug!(handler_id = %self.handler_id, "poll loop exited");
    }
}

impl std::fmt::Debug for HandlerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerAdapter")
            .field("handler_id", &self.handler_id)
            .field("prefix", &self.prefix)
            .field("state", &*self.state.lock())
            .finish()
    }
}
