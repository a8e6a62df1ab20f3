//! Ordered admission queue with disconnect reaping.
//!
//! A plain ordered list plus a single broadcast edge for "something
//! changed, go re-check your position". `tokio::sync::Notify::notify_waiters()`
//! gives signal-then-immediately-rearm semantics: every waiter parked
//! *before* the call wakes, every waiter parking *after* it waits for the
//! next edge.

use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Liveness check for a queued item's originating connection.
pub trait ConnectionProbe: Send + Sync + 'static {
    /// `true` once the client that submitted this item is gone.
    fn is_disconnected(&self) -> impl Future<Output = bool> + Send;
}

/// A disk- or memory-backed handle whose disk-backed form is cleaned up on
/// drop. The in-memory variant is a no-op on drop.
#[derive(Debug)]
pub enum BitmapHandle {
    Memory(bytes::Bytes),
    Disk(std::path::PathBuf),
}

impl BitmapHandle {
    /// Load the bitmap's bytes, reading from disk if backed by a path.
    pub fn load(&self) -> std::io::Result<bytes::Bytes> {
        match self {
            BitmapHandle::Memory(b) => Ok(b.clone()),
            BitmapHandle::Disk(path) => std::fs::read(path).map(bytes::Bytes::from),
        }
    }
}

impl Drop for BitmapHandle {
    fn drop(&mut self) {
        if let BitmapHandle::Disk(path) = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Input bitmap(s) for one queued item, owned until dispatch hands them to
/// an executor (or the item is reaped, which drops them).
pub enum DispatchInput {
    Single(BitmapHandle),
    Batch {
        images: Vec<BitmapHandle>,
        batch_size: usize,
    },
}

/// One queued admission request, identified by `task_id`.
pub struct QueueItem<P: ConnectionProbe> {
    pub task_id: String,
    pub user_id: String,
    pub probe: P,
    pub bitmap: DispatchInput,
}

impl<P: ConnectionProbe> QueueItem<P> {
    pub fn new(
        task_id: impl Into<String>,
        user_id: impl Into<String>,
        probe: P,
        bitmap: DispatchInput,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            user_id: user_id.into(),
            probe,
            bitmap,
        }
    }
}

/// Internal storage wraps the probe in `Arc` so [`TaskQueue::reap_disconnected`]
/// can clone a snapshot of probes and await them without holding the
/// (synchronous) items lock across an `.await` point.
struct StoredItem<P> {
    task_id: String,
    user_id: String,
    probe: Arc<P>,
}

/// Ordered queue of pending [`QueueItem`]s.
pub struct TaskQueue<P: ConnectionProbe> {
    items: Mutex<Vec<StoredItem<P>>>,
    change: Notify,
}

impl<P: ConnectionProbe> Default for TaskQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ConnectionProbe> TaskQueue<P> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            change: Notify::new(),
        }
    }

    /// Append an item at the tail, for position bookkeeping only. The
    /// caller separately drives the same `task_id` through
    /// [`crate::dispatch::dispatch_unary`] or
    /// [`crate::dispatch::dispatch_streaming`] with the actual [`QueueItem`]
    /// (bitmap included).
    pub fn enqueue(&self, task_id: impl Into<String>, user_id: impl Into<String>, probe: P) {
        let stored = StoredItem {
            task_id: task_id.into(),
            user_id: user_id.into(),
            probe: Arc::new(probe),
        };
        self.items.lock().unwrap_or_else(|e| e.into_inner()).push(stored);
    }

    /// Zero-based index of the item identified by `task_id`, or `None` if
    /// absent. A point-in-time observation, may be stale immediately.
    pub fn position_of(&self, task_id: &str) -> Option<usize> {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .position(|i| i.task_id == task_id)
    }

    /// Delete the item identified by `task_id`, then signal the change
    /// event. No-op if absent (still signals unconditionally).
    pub fn remove(&self, task_id: &str) {
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|i| i.task_id != task_id);
        self.signal_change();
    }

    /// Probe every item's client liveness concurrently and delete those
    /// whose clients have disconnected, then signal the change event.
    pub async fn reap_disconnected(&self) {
        // Clone a snapshot of (task_id, probe) pairs outside the lock: the
        // items mutex is synchronous and must not be held across `.await`.
        let snapshot: Vec<(String, Arc<P>)> = self
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|i| (i.task_id.clone(), i.probe.clone()))
            .collect();

        let mut disconnected_ids = std::collections::HashSet::new();
        for (task_id, probe) in snapshot {
            if probe.is_disconnected().await {
                disconnected_ids.insert(task_id);
            }
        }

        if !disconnected_ids.is_empty() {
            self.items
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|i| !disconnected_ids.contains(&i.task_id));
        }
        self.signal_change();
    }

    /// Signal-then-immediately-rearm: wakes every task currently parked in
    /// [`Self::wait_for_change`] without retaining the edge for later
    /// waiters.
    fn signal_change(&self) {
        self.change.notify_waiters();
    }

    /// The next change-event wait future. Callers that check a condition
    /// derived from queue state before awaiting this should call
    /// `.enable()` on it first (after `tokio::pin!`), so a change that
    /// lands in the gap between the check and the `.await` is not missed.
    pub fn wait_for_change(&self) -> tokio::sync::futures::Notified<'_> {
        self.change.notified()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct FakeProbe(Arc<AtomicBool>);

    impl ConnectionProbe for FakeProbe {
        async fn is_disconnected(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn position_of_tracks_fifo_order() {
        let queue: TaskQueue<FakeProbe> = TaskQueue::new();
        queue.enqueue("a", "u1", FakeProbe(Arc::new(AtomicBool::new(false))));
        queue.enqueue("b", "u1", FakeProbe(Arc::new(AtomicBool::new(false))));

        assert_eq!(queue.position_of("a"), Some(0));
        assert_eq!(queue.position_of("b"), Some(1));
        assert_eq!(queue.position_of("missing"), None);
    }

    #[tokio::test]
    async fn remove_shifts_remaining_positions_and_is_stable() {
        let queue: TaskQueue<FakeProbe> = TaskQueue::new();
        queue.enqueue("a", "u1", FakeProbe(Arc::new(AtomicBool::new(false))));
        queue.enqueue("b", "u1", FakeProbe(Arc::new(AtomicBool::new(false))));
        queue.enqueue("c", "u1", FakeProbe(Arc::new(AtomicBool::new(false))));

        queue.remove("a");
        assert_eq!(queue.position_of("b"), Some(0));
        assert_eq!(queue.position_of("c"), Some(1));
    }

    #[tokio::test]
    async fn reap_disconnected_removes_only_disconnected_items() {
        let queue: TaskQueue<FakeProbe> = TaskQueue::new();
        let gone = Arc::new(AtomicBool::new(true));
        let alive = Arc::new(AtomicBool::new(false));
        queue.enqueue("gone", "u1", FakeProbe(gone));
        queue.enqueue("alive", "u1", FakeProbe(alive));

        queue.reap_disconnected().await;

        assert_eq!(queue.position_of("gone"), None);
        assert_eq!(queue.position_of("alive"), Some(0));
    }

    #[tokio::test]
    async fn wait_for_change_wakes_on_remove_but_not_before() {
        let queue: Arc<TaskQueue<FakeProbe>> = Arc::new(TaskQueue::new());
        queue.enqueue("a", "u1", FakeProbe(Arc::new(AtomicBool::new(false))));

        let waiter_queue = queue.clone();
        let waiter = tokio::spawn(async move {
            waiter_queue.wait_for_change().await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        queue.remove("a");
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn memory_bitmap_handle_drop_is_noop() {
        let handle = BitmapHandle::Memory(bytes::Bytes::from_static(b"hello"));
        assert_eq!(handle.load().unwrap(), bytes::Bytes::from_static(b"hello"));
        drop(handle);
    }

    #[tokio::test]
    async fn disk_bitmap_handle_cleans_up_on_drop() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("inkstream-test-{}.bin", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"data").unwrap();
        assert!(path.exists());

        {
            let handle = BitmapHandle::Disk(path.clone());
            assert_eq!(handle.load().unwrap(), bytes::Bytes::from_static(b"data"));
        }
        assert!(!path.exists());
    }
}
