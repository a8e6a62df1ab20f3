//! Task-record data model.
//!
//! [`TaskRecord`] is the durable row mirrored into the task store on every
//! state transition of the dispatch loop. [`TaskUpdate`] is the sparse
//! mutator passed to [`crate::store::TaskStore::update`]; every field is
//! optional, and a field left as `None` leaves the stored value untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task record.
///
/// Monotonic progression: `Queued` → (`Processing`) → one of the three
/// terminal states. Never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// `true` once the status can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Dispatch mode of a task, selecting unary / streaming / batch handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    Single,
    Stream,
    Batch,
}

impl TaskMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskMode::Single => "single",
            TaskMode::Stream => "stream",
            TaskMode::Batch => "batch",
        }
    }
}

impl std::str::FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(TaskMode::Single),
            "stream" => Ok(TaskMode::Stream),
            "batch" => Ok(TaskMode::Batch),
            other => Err(format!("unknown task mode: {other}")),
        }
    }
}

/// A row in the `tasks` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub user_id: String,
    pub status: TaskStatus,
    pub mode: TaskMode,
    /// Opaque JSON-serialisable translation config. `None` if it failed to
    /// decode on read rather than erroring the whole fetch.
    pub config: Option<serde_json::Value>,
    /// Only meaningful while `status == Queued`.
    pub queue_position: Option<i64>,
    pub result_path: Option<String>,
    pub error: Option<String>,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Sparse mutation applied by [`crate::store::TaskStore::update`].
///
/// Every field defaults to `None` (no-op). If every field is `None`, the
/// store performs no write at all, not even touching `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub queue_position: Option<i64>,
    pub result_path: Option<String>,
    pub error: Option<String>,
    pub meta: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.queue_position.is_none()
            && self.result_path.is_none()
            && self.error.is_none()
            && self.meta.is_none()
            && self.started_at.is_none()
            && self.finished_at.is_none()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn queue_position(mut self, pos: i64) -> Self {
        self.queue_position = Some(pos);
        self
    }

    pub fn result_path(mut self, path: impl Into<String>) -> Self {
        self.result_path = Some(path.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn started_now(mut self) -> Self {
        self.started_at = Some(Utc::now());
        self
    }

    pub fn finished_now(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            TaskStatus::Queued,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<TaskStatus>().unwrap(), s);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn default_update_is_empty() {
        assert!(TaskUpdate::default().is_empty());
        assert!(!TaskUpdate::default().status(TaskStatus::Queued).is_empty());
    }
}
