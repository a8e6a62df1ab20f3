//! Fakes for exercising the dispatch loop without a real executor backend.
//!
//! Kept available behind the `testing` feature so the server binary can
//! also drive the HTTP surface end-to-end without a real translation
//! backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::executor::{ContextBlob, Executor, ExecutorNotification};
use crate::model::{TaskRecord, TaskStatus, TaskUpdate};
use crate::queue::ConnectionProbe;
use crate::store::TaskStore;

/// A [`ConnectionProbe`] whose answer is flipped by the test via
/// [`FakeConnectionProbe::disconnect`].
#[derive(Clone, Default)]
pub struct FakeConnectionProbe {
    disconnected: Arc<AtomicBool>,
}

impl FakeConnectionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

impl ConnectionProbe for FakeConnectionProbe {
    async fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

/// An [`Executor`] that either echoes its input back as the result or, when
/// configured via [`FakeExecutor::failing`], always fails with a given raw
/// error string.
#[derive(Clone)]
pub struct FakeExecutor {
    failure: Option<String>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self { failure: None }
    }

    /// Every call fails with `raw_error`, for exercising the failure path.
    pub fn failing(raw_error: impl Into<String>) -> Self {
        Self {
            failure: Some(raw_error.into()),
        }
    }
}

impl Default for FakeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for FakeExecutor {
    async fn run_unary(&self, bitmap: Bytes, _config: serde_json::Value) -> Result<Bytes, String> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(bitmap),
        }
    }

    async fn run_unary_batch(
        &self,
        bitmaps: Vec<Bytes>,
        _config: serde_json::Value,
        _batch_size: usize,
    ) -> Result<Bytes, String> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => {
                let mut out = bytes::BytesMut::new();
                for b in bitmaps {
                    out.extend_from_slice(&b);
                }
                Ok(out.freeze())
            }
        }
    }

    async fn run_streaming(
        &self,
        bitmap: Bytes,
        _config: serde_json::Value,
        notify: mpsc::Sender<ExecutorNotification>,
    ) -> Result<(), String> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => {
                let _ = notify
                    .send(ExecutorNotification::Result(ContextBlob(serde_json::json!({
                        "result": base64_encode(&bitmap),
                    }))))
                    .await;
                Ok(())
            }
        }
    }

    async fn run_streaming_batch(
        &self,
        bitmaps: Vec<Bytes>,
        _config: serde_json::Value,
        _batch_size: usize,
        notify: mpsc::Sender<ExecutorNotification>,
    ) -> Result<(), String> {
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => {
                let mut out = bytes::BytesMut::new();
                for b in bitmaps {
                    out.extend_from_slice(&b);
                }
                let _ = notify
                    .send(ExecutorNotification::Result(ContextBlob(serde_json::json!({
                        "result": base64_encode(&out.freeze()),
                    }))))
                    .await;
                Ok(())
            }
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes the `result` field written by [`FakeExecutor`]'s streaming path
/// back into raw bytes, for use as a [`crate::executor::ResultTransformer`]
/// in tests.
pub fn fake_result_transformer(blob: &ContextBlob) -> Bytes {
    use base64::Engine;
    let encoded = blob.0.get("result").and_then(|v| v.as_str()).unwrap_or_default();
    Bytes::from(
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap_or_default(),
    )
}

/// An in-memory [`TaskStore`], mirroring the SQLite implementation's
/// contract (sparse update, user-scoping, no-op guard) without a database.
#[derive(Clone, Default)]
pub struct InMemoryTaskStore {
    records: Arc<Mutex<HashMap<String, TaskRecord>>>,
    clock: Arc<AtomicI64>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        // Monotonic fake clock: avoids `chrono::Utc::now()` collisions when
        // tests assert strict ordering between writes that happen within
        // the same millisecond.
        let ticks = self.clock.fetch_add(1, Ordering::SeqCst);
        chrono::DateTime::from_timestamp(ticks, 0).unwrap_or_default()
    }
}

impl TaskStore for InMemoryTaskStore {
    async fn create(
        &self,
        task_id: &str,
        user_id: &str,
        mode: crate::model::TaskMode,
        config: Option<serde_json::Value>,
        meta: Option<serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        let now = self.now();
        let record = TaskRecord {
            id: task_id.to_owned(),
            user_id: user_id.to_owned(),
            status: TaskStatus::Queued,
            mode,
            config,
            queue_position: None,
            result_path: None,
            error: None,
            meta: meta.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        };
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id.to_owned(), record);
        Ok(())
    }

    async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<(), sqlx::Error> {
        if update.is_empty() {
            return Ok(());
        }
        let now = self.now();
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = guard.get_mut(task_id) {
            if let Some(status) = update.status {
                record.status = status;
            }
            if update.queue_position.is_some() {
                record.queue_position = update.queue_position;
            }
            if let Some(path) = update.result_path {
                record.result_path = Some(path);
            }
            if let Some(error) = update.error {
                record.error = Some(error);
            }
            if let Some(meta) = update.meta {
                record.meta = meta;
            }
            if let Some(started_at) = update.started_at {
                record.started_at = Some(started_at);
            }
            if let Some(finished_at) = update.finished_at {
                record.finished_at = Some(finished_at);
            }
            record.updated_at = now;
        }
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: i64) -> Result<Vec<TaskRecord>, sqlx::Error> {
        let mut records: Vec<TaskRecord> = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn get(&self, user_id: &str, task_id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }
}
