//! # Connection Gate
//!
//! A bounded counter capping how many dispatches are in flight at once.
//! Acquisition fails immediately at capacity; this is a counting
//! semaphore, not a pooled-resource manager. The slot is an RAII guard —
//! dropping it releases the count on every exit path, including early
//! dispatch errors.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::warn;

use crate::core::error::{GatewayError, GatewayResult};

/// Held for the lifetime of one admitted dispatch.
#[derive(Debug)]
pub struct ConnectionSlot {
    _permit: OwnedSemaphorePermit,
}

/// Bounded concurrent-dispatch admission.
#[derive(Debug)]
pub struct ConnectionGate {
    permits: Arc<Semaphore>,
    max: usize,
}

impl ConnectionGate {
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Take a slot, failing fast when saturated.
    pub fn try_acquire(&self) -> GatewayResult<ConnectionSlot> {
        match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => Ok(ConnectionSlot { _permit: permit }),
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                warn!(max = self.max, "connection gate saturated");
                Err(GatewayError::ConnectionsExhausted { max: self.max })
            }
        }
    }

    /// Slots currently available.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max(&self) -> usize {
        self.max
    }
}
