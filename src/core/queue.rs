//! # Bounded Queue
//!
//! The FIFO that carries envelopes between the dispatcher and a handler's
//! poll loop. Capacity-bounded in both directions: producers wait for a
//! vacancy up to a deadline and then fail fast, consumers wait for an item
//! up to a deadline and then give up — no queue operation blocks forever.
//!
//! Two semaphores (vacancies and occupants) meter the `VecDeque`; the
//! inner lock is synchronous and never held across an await point.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

/// Push rejected after the bounded wait; carries the item back so the
/// caller can log or drop it explicitly.
#[derive(Debug)]
pub struct QueueFull<T>(pub T);

/// A capacity-bounded async FIFO with timed push and pop.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    vacancies: Semaphore,
    occupants: Semaphore,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            vacancies: Semaphore::new(capacity),
            occupants: Semaphore::new(0),
            capacity,
        }
    }

    /// Append an item, waiting up to `wait` for a vacancy.
    pub async fn push_timeout(&self, item: T, wait: Duration) -> Result<(), QueueFull<T>> {
        match timeout(wait, self.vacancies.acquire()).await {
            Ok(Ok(permit)) => {
                // The vacancy is consumed for good; the matching permit is
                // re-added to `vacancies` when the item is popped.
                permit.forget();
                self.items.lock().push_back(item);
                self.occupants.add_permits(1);
                Ok(())
            }
            _ => Err(QueueFull(item)),
        }
    }

    /// Remove the oldest item, waiting up to `wait` for one to arrive.
    pub async fn pop_timeout(&self, wait: Duration) -> Option<T> {
        match timeout(wait, self.occupants.acquire()).await {
            Ok(Ok(permit)) => {
                permit.forget();
                let item = self.items.lock().pop_front();
                self.vacancies.add_permits(1);
                item
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
