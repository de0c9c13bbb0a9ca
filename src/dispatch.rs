//! # Request Dispatcher
//!
//! Carries one inbound request through the pipeline: resolve the handler
//! by prefix, ask the governor for admission, hand the envelope across
//! the handler's request queue, wait for the correlated response, and
//! record the outcome. Every failure is folded into a synthetic response
//! at this boundary — a dispatch call never panics a serving task and
//! never returns an error past itself.
//!
//! Admission is deliberately split from queueing: a rate-limit or
//! circuit-breaker refusal costs nothing but the check itself, before any
//! queue slot is touched.
//!
//! Concurrent callers targeting one handler share that handler's queue
//! pair. FIFO gives each caller *some* response, not necessarily its own;
//! the correlation check below is what turns "some response" into "my
//! response or a 500". A mismatched response is orphaned work from a
//! caller that already timed out — it is dropped, never re-queued.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use crate::core::config::QueueConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::queue::QueueFull;
use crate::core::types::{HandlerId, RequestEnvelope, ResponseEnvelope};
use crate::governor::PerformanceGovernor;
use crate::registry::{HandlerChannels, HandlerRegistry};

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    governor: Arc<PerformanceGovernor>,
    config: QueueConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        governor: Arc<PerformanceGovernor>,
        config: QueueConfig,
    ) -> Self {
        Self {
            registry,
            governor,
            config,
        }
    }

    /// Dispatch one request and produce its response.
    ///
    /// All outcomes except the pure 404 (no handler to attribute cost to)
    /// are recorded against the resolved handler, so rejected and failed
    /// requests show up in error-rate statistics.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let started = Instant::now();
        let request_id = request.request_id;

        let Some((handler_id, channels)) = self.registry.route(&request.path) else {
            debug!(path = %request.path, "no route");
            let err = GatewayError::route_not_found(&request.path);
            return ResponseEnvelope::text(request_id, err.status_code(), err.to_string());
        };

        let response = match self.try_dispatch(handler_id, &channels, request).await {
            Ok(response) => response,
            Err(err) => {
                match &err {
                    GatewayError::CorrelationMismatch { .. } => {
                        error!(%handler_id, %err, "dispatch failed")
                    }
                    _ => warn!(%handler_id, %err, "dispatch failed"),
                }
                ResponseEnvelope::text(request_id, err.status_code(), err.to_string())
            }
        };

        self.governor
            .record(handler_id, started.elapsed(), response.status.as_u16());
        response
    }

    async fn try_dispatch(
        &self,
        handler_id: HandlerId,
        channels: &HandlerChannels,
        request: RequestEnvelope,
    ) -> GatewayResult<ResponseEnvelope> {
        let request_id = request.request_id;

        // Held until this call returns, releasing the connection slot on
        // every path out.
        let _permit = self.governor.admit(handler_id)?;

        channels
            .requests
            .push_timeout(request, self.config.enqueue_timeout)
            .await
            .map_err(|QueueFull(_)| GatewayError::RequestQueueFull { handler_id })?;

        let response = channels
            .responses
            .pop_timeout(self.config.response_timeout)
            .await
            .ok_or(GatewayError::ResponseTimeout {
                handler_id,
                timeout: self.config.response_timeout,
            })?;

        if response.request_id != request_id {
            // The mismatched response belongs to a caller that gave up;
            // dropping it here is what keeps it from answering the wrong
            // request.
            return Err(GatewayError::CorrelationMismatch {
                expected: request_id,
                actual: response.request_id,
            });
        }

        Ok(response)
    }
}
