//! Bounded admission for stage workers.
//!
//! A counted semaphore guards admission (one permit per in-flight worker)
//! and an atomic gauge feeds the status display. Admission order follows
//! the semaphore's FIFO queue, so parallelism is bounded and no waiter
//! starves.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    in_flight: Arc<AtomicI64>,
}

/// An occupied pool slot; dropping it releases the permit.
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicI64>,
}

impl WorkerPool {
    pub fn new(size: i64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(size.max(1) as usize)),
            in_flight: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Waits for a free slot, then occupies it.
    pub async fn start(&self) -> WorkerSlot {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed");
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        WorkerSlot {
            _permit: permit,
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
