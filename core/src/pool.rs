//! Bounded worker pool shared by the calls of one client.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

pub(crate) type PermitFuture =
    Pin<Box<dyn Future<Output = Result<OwnedSemaphorePermit, AcquireError>> + Send>>;

/// Caps how many transport tasks run at once. Cloning shares the cap.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// A capacity of zero is raised to one so calls can always make progress.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots not currently held by a running task.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    pub(crate) fn acquire(&self) -> PermitFuture {
        Box::pin(Arc::clone(&self.slots).acquire_owned())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::*;

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(WorkerPool::new(0).capacity(), 1);
    }

    #[test]
    fn permits_are_shared_between_clones() {
        let pool = WorkerPool::new(2);
        let clone = pool.clone();
        let a = pool.acquire().now_or_never().unwrap().unwrap();
        let _b = clone.acquire().now_or_never().unwrap().unwrap();
        assert_eq!(pool.available(), 0);
        assert!(pool.acquire().now_or_never().is_none());
        drop(a);
        assert_eq!(clone.available(), 1);
    }
}
