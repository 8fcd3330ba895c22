//! Render concurrency gate.
//!
//! Bounds the number of simultaneous render operations touching the shared
//! browser process. Callers beyond capacity block until a slot frees; there
//! is no reject-on-full path. Slots release on drop, so no exit path (panic
//! included) can leak capacity.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate with fixed capacity.
#[derive(Clone)]
pub struct RenderGate {
    sem: Arc<Semaphore>,
}

/// A held capacity token. Dropping it releases the slot.
pub struct RenderSlot {
    _permit: OwnedSemaphorePermit,
}

impl RenderGate {
    /// Create a gate with the given capacity, clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self { sem: Arc::new(Semaphore::new(capacity.max(1))) }
    }

    /// Acquire one slot, waiting as long as it takes.
    pub async fn acquire(&self) -> RenderSlot {
        // The semaphore is never closed, so acquisition cannot fail.
        let permit = Arc::clone(&self.sem)
            .acquire_owned()
            .await
            .expect("render gate semaphore closed");
        RenderSlot { _permit: permit }
    }

    /// Currently free slots; used by tests.
    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_released_on_drop() {
        let gate = RenderGate::new(1);
        assert_eq!(gate.available(), 1);
        {
            let _slot = gate.acquire().await;
            assert_eq!(gate.available(), 0);
        }
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test]
    async fn test_capacity_clamped_to_one() {
        let gate = RenderGate::new(0);
        assert_eq!(gate.available(), 1);
    }
}
