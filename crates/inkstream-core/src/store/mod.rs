//! Durable CRUD for task records.
//!
//! [`TaskStore`] is the interface the dispatch loop consumes; [`sqlite`]
//! provides the default SQLite-backed implementation. Swap in another
//! backend by implementing the trait for a new type, without touching
//! handler code.
//!
//! All trait methods use `impl Future` in their signatures (stable since
//! Rust 1.75) so no extra `async-trait` crate is required.

pub mod sqlite;

use crate::model::{TaskMode, TaskRecord, TaskUpdate};

/// Durable CRUD interface over task records.
pub trait TaskStore: Send + Sync + 'static {
    /// Insert a new record with `status = queued` and
    /// `created_at = updated_at = now`.
    fn create(
        &self,
        task_id: &str,
        user_id: &str,
        mode: TaskMode,
        config: Option<serde_json::Value>,
        meta: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Sparse mutation: only fields set on `update` change. A no-op
    /// `TaskUpdate` (every field `None`) performs no write at all.
    fn update(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Newest-first, scoped to `user_id`.
    fn list(
        &self,
        user_id: &str,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<TaskRecord>, sqlx::Error>> + Send;

    /// Scoped to `user_id`; returns `None` if absent or owned by another user.
    fn get(
        &self,
        user_id: &str,
        task_id: &str,
    ) -> impl Future<Output = Result<Option<TaskRecord>, sqlx::Error>> + Send;
}
