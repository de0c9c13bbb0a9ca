//! # Gateway Context
//!
//! The composition root: one explicitly constructed object owning the
//! registry, the governor, the dispatcher, and the table of handler
//! adapters. Everything that needs shared state gets a handle to this
//! context — there is no ambient global to reach for.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::adapter::HandlerAdapter;
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{Handler, HandlerId, RequestEnvelope, ResponseEnvelope};
use crate::dispatch::Dispatcher;
use crate::governor::{PerformanceGovernor, StatsReport};
use crate::registry::HandlerRegistry;

struct AdapterEntry {
    adapter: Arc<HandlerAdapter>,
    task: Option<JoinHandle<()>>,
}

/// Shared state and handler lifecycle for one gateway instance.
pub struct GatewayContext {
    config: GatewayConfig,
    registry: Arc<HandlerRegistry>,
    governor: Arc<PerformanceGovernor>,
    dispatcher: Dispatcher,
    adapters: Mutex<HashMap<HandlerId, AdapterEntry>>,
}

impl GatewayContext {
    /// Build a context from a validated configuration.
    pub fn new(config: GatewayConfig) -> GatewayResult<Arc<Self>> {
        config.validate()?;
        let registry = Arc::new(HandlerRegistry::new(config.queues.clone()));
        let governor = Arc::new(PerformanceGovernor::new(&config.governor));
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&governor),
            config.queues.clone(),
        );
        Ok(Arc::new(Self {
            config,
            registry,
            governor,
            dispatcher,
            adapters: Mutex::new(HashMap::new()),
        }))
    }

    /// Create an adapter for a handler under the given prefix.
    ///
    /// The handler is not routable until `start_handler` brings its poll
    /// loop up; prefix conflicts surface there, at registration time.
    pub fn register_handler(
        &self,
        prefix: &str,
        handler: Arc<dyn Handler>,
    ) -> GatewayResult<HandlerId> {
        let handler_id = HandlerId::new();
        let adapter = Arc::new(HandlerAdapter::new(
            handler_id,
            prefix,
            handler,
            Arc::clone(&self.registry),
            self.config.queues.clone(),
        ));
        self.adapters.lock().insert(
            handler_id,
            AdapterEntry {
                adapter,
                task: None,
            },
        );
        info!(%handler_id, prefix, "handler adapter created");
        Ok(handler_id)
    }

    /// Start a registered handler's poll loop.
    ///
    /// Fails with a startup error when the poll-worker cap is reached,
    /// and with a registration error on a prefix conflict; in both cases
    /// nothing is left half-started.
    pub fn start_handler(&self, handler_id: HandlerId) -> GatewayResult<()> {
        let mut adapters = self.adapters.lock();

        let running = adapters
            .values()
            .filter(|entry| entry.adapter.is_running())
            .count();
        if running >= self.config.governor.max_poll_workers {
            return Err(GatewayError::startup(format!(
                "poll worker limit reached ({} running)",
                running
            )));
        }

        let entry = adapters.get_mut(&handler_id).ok_or_else(|| {
            GatewayError::registration(format!("unknown handler {handler_id}"))
        })?;

        let channels = entry.adapter.attach()?;
        let task = {
            let adapter = Arc::clone(&entry.adapter);
            tokio::spawn(async move { adapter.run(channels).await })
        };
        entry.task = Some(task);
        Ok(())
    }

    /// Stop a handler: cancel its poll loop, join it with a bounded wait,
    /// and drop all of its per-handler state.
    pub async fn stop_handler(&self, handler_id: HandlerId) -> GatewayResult<()> {
        let entry = self.adapters.lock().remove(&handler_id).ok_or_else(|| {
            GatewayError::registration(format!("unknown handler {handler_id}"))
        })?;

        entry.adapter.stop();
        if let Some(task) = entry.task {
            let abort = task.abort_handle();
            match timeout(self.config.queues.stop_join_timeout, task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    // A panicking handler takes its poll task down before
                    // detach can run; force cleanup so the prefix frees up.
                    warn!(%handler_id, %join_err, "poll loop task failed");
                    entry.adapter.detach();
                }
                Err(_) => {
                    warn!(%handler_id, "poll loop did not exit in time, aborting");
                    abort.abort();
                    entry.adapter.detach();
                }
            }
        }
        self.governor.forget(handler_id);
        Ok(())
    }

    /// Run one request through the dispatch pipeline.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        self.dispatcher.dispatch(request).await
    }

    /// Monitor statistics, optionally scoped to one handler.
    pub fn stats(&self, handler_id: Option<HandlerId>) -> StatsReport {
        self.governor.stats(handler_id)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn governor(&self) -> &PerformanceGovernor {
        &self.governor
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Handlers with a live poll loop right now.
    pub fn running_count(&self) -> usize {
        self.adapters
            .lock()
            .values()
            .filter(|entry| entry.adapter.is_running())
            .count()
    }
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("registered", &self.registry.registered_count())
            .field("running", &self.running_count())
            .finish()
    }
}
