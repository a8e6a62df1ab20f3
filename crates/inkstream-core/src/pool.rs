//! Bounded, fair checkout of executor handles.
//!
//! Blocks until a concrete handle is free, then hands it out. A
//! `tokio::sync::Semaphore` does the fairness and blocking work; a
//! synchronous `Mutex` holds the actual idle handles so
//! [`PooledExecutor::drop`] can return one without needing an async
//! context.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::{Notify, Semaphore};

/// Fixed-size pool of executor handles of type `T`.
///
/// `acquire()` blocks until a handle is idle, satisfying waiters in FIFO
/// order. The handle count is fixed at construction.
#[derive(Debug)]
pub struct ExecutorPool<T> {
    inner: Arc<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<T>>,
    total: usize,
    /// Fired whenever a handle is released. The dispatch loop's waiting
    /// step needs this in addition to the queue's own change-event: a
    /// released executor can admit an already-queued item without the
    /// queue itself having changed.
    released: Notify,
}

impl<T> Clone for ExecutorPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> ExecutorPool<T> {
    /// Build a pool from a fixed set of handles. The pool's capacity is
    /// `handles.len()` and never changes afterwards.
    pub fn new(handles: impl IntoIterator<Item = T>) -> Self {
        let idle: VecDeque<T> = handles.into_iter().collect();
        let total = idle.len();
        let semaphore = Arc::new(Semaphore::new(total));
        Self {
            inner: Arc::new(Inner {
                semaphore,
                idle: Mutex::new(idle),
                total,
                released: Notify::new(),
            }),
        }
    }

    /// Total number of handles this pool was constructed with. Fixed for
    /// the lifetime of the pool.
    pub fn total_count(&self) -> usize {
        self.inner.total
    }

    /// Number of idle handles right now. Advisory, may be stale the
    /// instant it is read.
    pub fn free_count(&self) -> usize {
        self.inner.semaphore.available_permits()
    }

    /// The next handle-release wait future. Callers that check a condition
    /// derived from [`Self::free_count`] before awaiting this should call
    /// `.enable()` on it first (after `tokio::pin!`), so a release that
    /// lands in the gap between the check and the `.await` is not missed.
    pub fn wait_for_release(&self) -> tokio::sync::futures::Notified<'_> {
        self.inner.released.notified()
    }

    /// Block until a handle is idle, then check it out.
    ///
    /// Waiters are served in FIFO arrival order (`tokio::sync::Semaphore`'s
    /// documented fairness guarantee). The returned [`PooledExecutor`]
    /// releases the handle back to the pool when dropped, regardless of
    /// whether the caller's job succeeded, failed, or was cancelled.
    pub async fn acquire(&self) -> PooledExecutor<T> {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("ExecutorPool semaphore is never closed");

        let handle = self
            .inner
            .idle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .expect("semaphore permit implies an idle handle is present");

        PooledExecutor {
            handle: Some(handle),
            pool: self.inner.clone(),
            _permit: permit,
        }
    }
}

/// A checked-out executor handle. Returns itself to the pool on drop.
pub struct PooledExecutor<T> {
    handle: Option<T>,
    pool: Arc<Inner<T>>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl<T> std::ops::Deref for PooledExecutor<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.handle.as_ref().expect("handle taken only on drop")
    }
}

impl<T> std::ops::DerefMut for PooledExecutor<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.handle.as_mut().expect("handle taken only on drop")
    }
}

impl<T> Drop for PooledExecutor<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_back(handle);
        }
        self.pool.released.notify_waiters();
        // `_permit` is dropped after this and wakes the next FIFO waiter.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn acquire_release_round_trips_total_count() {
        let pool = ExecutorPool::new([1, 2, 3]);
        assert_eq!(pool.total_count(), 3);
        assert_eq!(pool.free_count(), 3);

        let permit = pool.acquire().await;
        assert_eq!(pool.free_count(), 2);
        drop(permit);
        assert_eq!(pool.free_count(), 3);
    }

    #[tokio::test]
    async fn acquire_blocks_when_exhausted_and_unblocks_on_release() {
        let pool = ExecutorPool::new([1]);
        let first = pool.acquire().await;
        assert_eq!(pool.free_count(), 0);

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move {
            let _second = pool2.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn every_acquired_handle_is_released_exactly_once_on_panic_path() {
        let pool = ExecutorPool::new([1]);
        {
            let _permit = pool.acquire().await;
            // Simulated early-return / cancellation: permit dropped here.
        }
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.total_count(), 1);
    }

    #[tokio::test]
    async fn waiters_are_served_fifo() {
        let pool = ExecutorPool::new([1]);
        let first = pool.acquire().await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let pool = pool.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                // Stagger spawn registration so semaphore wait order is
                // deterministic for the assertion below.
                tokio::time::sleep(Duration::from_millis(i * 5)).await;
                let _permit = pool.acquire().await;
                order.lock().unwrap().push(i);
            }));
        }

        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(first);
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }
}
