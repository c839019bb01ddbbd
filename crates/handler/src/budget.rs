//! Concurrency budget for transfer jobs.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting budget of job slots. Clones share the same budget.
#[derive(Clone)]
pub struct JobBudget {
    slots: Arc<Semaphore>,
    limit: usize,
}

impl JobBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Takes a slot, or `None` when the budget is spent. The slot frees
    /// itself on drop.
    pub fn try_acquire(&self) -> Option<JobSlot> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| JobSlot { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// One reserved job slot.
pub struct JobSlot {
    _permit: OwnedSemaphorePermit,
}
