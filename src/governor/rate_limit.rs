//! # Sliding-Window Rate Limiter
//!
//! Counts admitted requests in the trailing one-second interval, once
//! globally and once per handler. Expired timestamps are pruned lazily on
//! each check. This is a plain sliding-window counter, not a token
//! bucket: bursts exactly at the configured ceiling pass, nothing
//! smoother.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::core::error::{GatewayError, GatewayResult, LimitScope};
use crate::core::types::HandlerId;

/// Default trailing interval for both windows.
const WINDOW: Duration = Duration::from_secs(1);

/// Global plus per-handler sliding windows behind one check call.
#[derive(Debug)]
pub struct RateLimiter {
    max_global: usize,
    max_per_handler: usize,
    window: Duration,
    global: Mutex<VecDeque<Instant>>,
    per_handler: DashMap<HandlerId, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_global: usize, max_per_handler: usize) -> Self {
        Self::with_window(max_global, max_per_handler, WINDOW)
    }

    /// Same limiter with a custom window; tests use short windows to
    /// exercise expiry without real one-second sleeps.
    pub fn with_window(max_global: usize, max_per_handler: usize, window: Duration) -> Self {
        Self {
            max_global,
            max_per_handler,
            window,
            global: Mutex::new(VecDeque::new()),
            per_handler: DashMap::new(),
        }
    }

    /// Admit or reject one request for `handler_id`.
    ///
    /// Both windows are pruned and checked before either gains the
    /// timestamp, so a rejection leaves no trace in either window. The
    /// global lock is taken before the handler entry, always in that
    /// order.
    pub fn check(&self, handler_id: HandlerId) -> GatewayResult<()> {
        let now = Instant::now();
        let cutoff = now - self.window;

        let mut global = self.global.lock();
        prune(&mut global, cutoff);

        let mut handler = self.per_handler.entry(handler_id).or_default();
        prune(handler.value_mut(), cutoff);

        if global.len() >= self.max_global {
            warn!(%handler_id, "global rate limit exceeded");
            return Err(GatewayError::RateLimited {
                scope: LimitScope::Global,
            });
        }
        if handler.len() >= self.max_per_handler {
            warn!(%handler_id, "handler rate limit exceeded");
            return Err(GatewayError::RateLimited {
                scope: LimitScope::Handler,
            });
        }

        global.push_back(now);
        handler.push_back(now);
        Ok(())
    }

    /// Drop a handler's window once it unregisters.
    pub fn forget(&self, handler_id: HandlerId) {
        self.per_handler.remove(&handler_id);
    }
}

fn prune(window: &mut VecDeque<Instant>, cutoff: Instant) {
    while window.front().is_some_and(|t| *t < cutoff) {
        window.pop_front();
    }
}
