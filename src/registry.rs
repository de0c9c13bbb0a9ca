//! # Handler Registry
//!
//! Owns the mapping from path prefix to handler identity, and each
//! handler's request/response queue pair. The whole table sits behind one
//! `RwLock`; routing takes a read lock and scans every registration, which
//! is fine at the expected scale (tens of handlers, not thousands).
//!
//! Routing picks the registration whose prefix is the **longest**
//! string-prefix of the request path. Two distinct prefixes of equal
//! length can never both match one path, so with unique prefixes there is
//! no tie to break; the scan still runs in registration order with a
//! strict greater-than comparison, so earliest-registered-wins would hold
//! if the invariant were ever relaxed.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::QueueConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::queue::BoundedQueue;
use crate::core::types::{HandlerId, HandlerInfo, RequestEnvelope, ResponseEnvelope};

/// The queue pair connecting the dispatcher to one handler's poll loop.
#[derive(Debug)]
pub struct HandlerChannels {
    pub requests: BoundedQueue<RequestEnvelope>,
    pub responses: BoundedQueue<ResponseEnvelope>,
}

impl HandlerChannels {
    fn new(config: &QueueConfig) -> Self {
        Self {
            requests: BoundedQueue::new(config.request_queue_capacity),
            responses: BoundedQueue::new(config.response_queue_capacity),
        }
    }
}

#[derive(Debug)]
struct Registration {
    handler_id: HandlerId,
    prefix: String,
    active: bool,
    channels: Arc<HandlerChannels>,
}

/// Prefix-keyed handler table; the only structure mutated by multiple
/// independent tasks outside the governor.
#[derive(Debug)]
pub struct HandlerRegistry {
    registrations: RwLock<Vec<Registration>>,
    queue_config: QueueConfig,
}

/// Normalize a routing prefix: ensure a leading `/`, strip the trailing
/// `/`; the empty string (and bare `/`) mean "match everything".
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix == "/" {
        return String::new();
    }
    let mut normalized = if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{prefix}")
    };
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

impl HandlerRegistry {
    pub fn new(queue_config: QueueConfig) -> Self {
        Self {
            registrations: RwLock::new(Vec::new()),
            queue_config,
        }
    }

    /// Register a handler under a prefix, creating its queue pair.
    ///
    /// The prefix is normalized first. Fails without mutating anything if
    /// the prefix or the handler id is already registered. Newly
    /// registered handlers start inactive until `set_active`.
    pub fn register(&self, handler_id: HandlerId, prefix: &str) -> GatewayResult<Arc<HandlerChannels>> {
        let prefix = normalize_prefix(prefix);
        let mut registrations = self.registrations.write();

        if registrations.iter().any(|r| r.prefix == prefix) {
            warn!(%handler_id, prefix, "prefix already registered");
            return Err(GatewayError::registration(format!(
                "prefix {prefix:?} is already registered"
            )));
        }
        if registrations.iter().any(|r| r.handler_id == handler_id) {
            warn!(%handler_id, "handler id already registered");
            return Err(GatewayError::registration(format!(
                "handler {handler_id} is already registered"
            )));
        }

        let channels = Arc::new(HandlerChannels::new(&self.queue_config));
        registrations.push(Registration {
            handler_id,
            prefix: prefix.clone(),
            active: false,
            channels: Arc::clone(&channels),
        });
        info!(%handler_id, prefix, "handler registered");
        Ok(channels)
    }

    /// Remove a registration and discard its queues.
    ///
    /// Returns `false` if the handler id is unknown.
    pub fn unregister(&self, handler_id: HandlerId) -> bool {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| r.handler_id != handler_id);
        let removed = registrations.len() < before;
        if removed {
            info!(%handler_id, "handler unregistered");
        }
        removed
    }

    /// Resolve the handler for a path by longest matching prefix.
    ///
    /// The active flag is deliberately not consulted; it only feeds the
    /// health and listing endpoints.
    pub fn route(&self, path: &str) -> Option<(HandlerId, Arc<HandlerChannels>)> {
        let registrations = self.registrations.read();
        let mut best: Option<&Registration> = None;
        for registration in registrations.iter() {
            if path.starts_with(registration.prefix.as_str()) {
                let beats = best
                    .map(|b| registration.prefix.len() > b.prefix.len())
                    .unwrap_or(true);
                if beats {
                    best = Some(registration);
                }
            }
        }
        let hit = best.map(|r| (r.handler_id, Arc::clone(&r.channels)));
        if hit.is_none() {
            debug!(path, "no matching prefix");
        }
        hit
    }

    /// Toggle a handler's active flag. Returns `false` if unknown.
    pub fn set_active(&self, handler_id: HandlerId, active: bool) -> bool {
        let mut registrations = self.registrations.write();
        match registrations.iter_mut().find(|r| r.handler_id == handler_id) {
            Some(registration) => {
                registration.active = active;
                true
            }
            None => false,
        }
    }

    /// The queue pair for a handler, if registered.
    pub fn channels(&self, handler_id: HandlerId) -> Option<Arc<HandlerChannels>> {
        self.registrations
            .read()
            .iter()
            .find(|r| r.handler_id == handler_id)
            .map(|r| Arc::clone(&r.channels))
    }

    /// Listing of all registrations, in registration order.
    pub fn snapshot(&self) -> Vec<HandlerInfo> {
        self.registrations
            .read()
            .iter()
            .map(|r| HandlerInfo {
                handler_id: r.handler_id,
                prefix: r.prefix.clone(),
                active: r.active,
            })
            .collect()
    }

    pub fn registered_count(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn active_count(&self) -> usize {
        self.registrations.read().iter().filter(|r| r.active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new(QueueConfig::default())
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("api"), "/api");
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("/api/"), "/api");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
        assert_eq!(normalize_prefix("api/v1/"), "/api/v1");
    }

    #[test]
    fn test_register_and_route() {
        let registry = registry();
        let id = HandlerId::new();
        registry.register(id, "/svc").unwrap();

        let (routed, _) = registry.route("/svc/items").unwrap();
        assert_eq!(routed, id);
        assert!(registry.route("/other").is_none());
    }

    #[test]
    fn test_duplicate_prefix_rejected_without_mutation() {
        let registry = registry();
        let first = HandlerId::new();
        registry.register(first, "/svc").unwrap();

        let err = registry.register(HandlerId::new(), "svc/").unwrap_err();
        assert!(matches!(err, GatewayError::Registration { .. }));

        // The original registration is untouched.
        assert_eq!(registry.registered_count(), 1);
        let (routed, _) = registry.route("/svc").unwrap();
        assert_eq!(routed, first);
    }

    #[test]
    fn test_duplicate_handler_id_rejected() {
        let registry = registry();
        let id = HandlerId::new();
        registry.register(id, "/a").unwrap();
        assert!(registry.register(id, "/b").is_err());
        assert_eq!(registry.registered_count(), 1);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let registry = registry();
        let short = HandlerId::new();
        let long = HandlerId::new();
        registry.register(short, "/api").unwrap();
        registry.register(long, "/api/v2").unwrap();

        assert_eq!(registry.route("/api/v2/users").unwrap().0, long);
        assert_eq!(registry.route("/api/v1/users").unwrap().0, short);
        // Registration order must not matter for the length rule.
        assert_eq!(registry.route("/api").unwrap().0, short);
    }

    #[test]
    fn test_empty_prefix_is_catch_all_with_lowest_priority() {
        let registry = registry();
        let catch_all = HandlerId::new();
        let specific = HandlerId::new();
        registry.register(catch_all, "").unwrap();
        registry.register(specific, "/svc").unwrap();

        assert_eq!(registry.route("/svc/x").unwrap().0, specific);
        assert_eq!(registry.route("/anything/else").unwrap().0, catch_all);
    }

    #[test]
    fn test_unregister_discards_registration() {
        let registry = registry();
        let id = HandlerId::new();
        registry.register(id, "/svc").unwrap();

        assert!(registry.unregister(id));
        assert!(registry.route("/svc").is_none());
        assert!(registry.channels(id).is_none());
        // Second unregister is a no-op.
        assert!(!registry.unregister(id));
        // The prefix is free again.
        registry.register(HandlerId::new(), "/svc").unwrap();
    }

    #[test]
    fn test_active_flag_feeds_counts_not_routing() {
        let registry = registry();
        let id = HandlerId::new();
        registry.register(id, "/svc").unwrap();
        assert_eq!(registry.active_count(), 0);

        assert!(registry.set_active(id, true));
        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.registered_count(), 1);

        // Inactive handlers are still routable.
        assert!(registry.set_active(id, false));
        assert!(registry.route("/svc").is_some());

        assert!(!registry.set_active(HandlerId::new(), true));
    }

    #[test]
    fn test_snapshot_lists_registrations_in_order() {
        let registry = registry();
        let a = HandlerId::new();
        let b = HandlerId::new();
        registry.register(a, "/a").unwrap();
        registry.register(b, "/b").unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].handler_id, a);
        assert_eq!(snapshot[0].prefix, "/a");
        assert!(!snapshot[0].active);
        assert_eq!(snapshot[1].handler_id, b);
    }
}
