//! SQLite implementation of [`TaskStore`].
//!
//! Uses [`sqlx`] with the `sqlite` feature. Migrations are run automatically
//! on startup via [`SqliteTaskStore::connect`].
//!
//! # Migrations path
//!
//! `sqlx::migrate!("./migrations")` resolves the path **at compile time**
//! relative to `CARGO_MANIFEST_DIR` (this crate's root), so the directory is
//! embedded into the binary. The database file location is determined at
//! runtime by the connection URL and is **not** related to the current
//! working directory at runtime.
//!
//! # Queries
//!
//! The `sqlx::query` (runtime-verified) form is used deliberately so that no
//! `DATABASE_URL` environment variable is needed at compile time.
//!
//! # Serialisation
//!
//! SQLite accepts one writer at a time; `sqlx::SqlitePool` serialises
//! writes against a single connection by default, which gives every
//! record's updates a total order.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::warn;

use crate::model::{TaskMode, TaskRecord, TaskStatus, TaskUpdate};
use crate::store::TaskStore;

/// SQLite-backed task store.
#[derive(Clone, Debug)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Open (or create) the SQLite database at `url` and run pending
    /// migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://inkstream.db?mode=rwc"` or `"sqlite::memory:"` for tests.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePool::connect(url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn serialize_json(value: &serde_json::Value) -> String {
    // No pretty-printing: keeps stored JSON columns compact.
    value.to_string()
}

/// Decode failures yield `null` rather than an error.
fn decode_json(raw: Option<String>) -> serde_json::Value {
    match raw {
        None => serde_json::Value::Null,
        Some(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            warn!(error = %e, "failed to decode stored JSON column; using null");
            serde_json::Value::Null
        }),
    }
}

fn decode_json_opt(raw: Option<String>) -> Option<serde_json::Value> {
    match decode_json(raw) {
        serde_json::Value::Null => None,
        other => Some(other),
    }
}

fn parse_timestamp(raw: &str, field: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        warn!(raw, field, error = %e, "failed to parse stored timestamp; using now");
        Utc::now()
    })
}

fn parse_timestamp_opt(raw: Option<String>, field: &str) -> Option<DateTime<Utc>> {
    raw.map(|r| parse_timestamp(&r, field))
}

type TaskRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    String,
);

fn row_to_record(row: TaskRow) -> TaskRecord {
    let (
        id,
        user_id,
        status,
        mode,
        config,
        queue_position,
        result_path,
        error,
        meta,
        created_at,
        started_at,
        finished_at,
        updated_at,
    ) = row;

    TaskRecord {
        id,
        user_id,
        status: status.parse().unwrap_or(TaskStatus::Failed),
        mode: mode.parse().unwrap_or(TaskMode::Single),
        config: decode_json_opt(config),
        queue_position,
        result_path,
        error,
        meta: decode_json(meta),
        created_at: parse_timestamp(&created_at, "created_at"),
        started_at: parse_timestamp_opt(started_at, "started_at"),
        finished_at: parse_timestamp_opt(finished_at, "finished_at"),
        updated_at: parse_timestamp(&updated_at, "updated_at"),
    }
}

const SELECT_COLUMNS: &str = "id, user_id, status, mode, config, queue_position, result_path, \
     error, meta, created_at, started_at, finished_at, updated_at";

impl TaskStore for SqliteTaskStore {
    async fn create(
        &self,
        task_id: &str,
        user_id: &str,
        mode: TaskMode,
        config: Option<serde_json::Value>,
        meta: Option<serde_json::Value>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let config = config.as_ref().map(serialize_json);
        let meta = meta.unwrap_or_else(|| serde_json::json!({}));
        let meta = serialize_json(&meta);

        sqlx::query(
            "INSERT INTO tasks (id, user_id, status, mode, config, queue_position, \
             result_path, error, meta, created_at, started_at, finished_at, updated_at) \
             VALUES (?1, ?2, 'queued', ?3, ?4, NULL, NULL, NULL, ?5, ?6, NULL, NULL, ?6)",
        )
        .bind(task_id)
        .bind(user_id)
        .bind(mode.as_str())
        .bind(&config)
        .bind(&meta)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<(), sqlx::Error> {
        // Absence of fields is a no-op, not even `updated_at` is touched.
        if update.is_empty() {
            return Ok(());
        }

        let mut fields: Vec<&str> = Vec::new();
        let status = update.status.map(|s| s.as_str().to_owned());
        let meta = update.meta.as_ref().map(serialize_json);
        let started_at = update.started_at.map(|t| t.to_rfc3339());
        let finished_at = update.finished_at.map(|t| t.to_rfc3339());
        let updated_at = Utc::now().to_rfc3339();

        if status.is_some() {
            fields.push("status = ?");
        }
        if update.queue_position.is_some() {
            fields.push("queue_position = ?");
        }
        if update.result_path.is_some() {
            fields.push("result_path = ?");
        }
        if update.error.is_some() {
            fields.push("error = ?");
        }
        if meta.is_some() {
            fields.push("meta = ?");
        }
        if started_at.is_some() {
            fields.push("started_at = ?");
        }
        if finished_at.is_some() {
            fields.push("finished_at = ?");
        }
        fields.push("updated_at = ?");

        let mut placeholder = 1;
        let set_clause = fields
            .iter()
            .map(|f| {
                let f = f.replace('?', &format!("?{placeholder}"));
                placeholder += 1;
                f
            })
            .collect::<Vec<_>>()
            .join(", ");
        let where_placeholder = placeholder;
        let query = format!("UPDATE tasks SET {set_clause} WHERE id = ?{where_placeholder}");

        let mut q = sqlx::query(&query);
        if let Some(s) = &status {
            q = q.bind(s);
        }
        if let Some(p) = update.queue_position {
            q = q.bind(p);
        }
        if let Some(r) = &update.result_path {
            q = q.bind(r);
        }
        if let Some(e) = &update.error {
            q = q.bind(e);
        }
        if let Some(m) = &meta {
            q = q.bind(m);
        }
        if let Some(s) = &started_at {
            q = q.bind(s);
        }
        if let Some(f) = &finished_at {
            q = q.bind(f);
        }
        q = q.bind(&updated_at);
        q = q.bind(task_id);

        q.execute(&self.pool).await?;
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: i64) -> Result<Vec<TaskRecord>, sqlx::Error> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2"
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }

    async fn get(&self, user_id: &str, task_id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks WHERE user_id = ?1 AND id = ?2"
        ))
        .bind(user_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteTaskStore {
        SqliteTaskStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = memory_store().await;
        store
            .create(
                "t1",
                "alice",
                TaskMode::Single,
                Some(serde_json::json!({"target_lang": "en"})),
                None,
            )
            .await
            .unwrap();

        let record = store.get("alice", "t1").await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Queued);
        assert_eq!(record.mode, TaskMode::Single);
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.started_at.is_none());
        assert!(record.finished_at.is_none());
        assert_eq!(
            record.config,
            Some(serde_json::json!({"target_lang": "en"}))
        );
    }

    #[tokio::test]
    async fn get_scoped_by_user_id() {
        let store = memory_store().await;
        store
            .create("t1", "alice", TaskMode::Single, None, None)
            .await
            .unwrap();

        assert!(store.get("bob", "t1").await.unwrap().is_none());
        assert!(store.get("alice", "t1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn sparse_update_only_touches_supplied_fields() {
        let store = memory_store().await;
        store
            .create("t1", "alice", TaskMode::Single, None, None)
            .await
            .unwrap();

        store
            .update("t1", TaskUpdate::default().queue_position(2))
            .await
            .unwrap();

        let record = store.get("alice", "t1").await.unwrap().unwrap();
        assert_eq!(record.queue_position, Some(2));
        assert_eq!(record.status, TaskStatus::Queued);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn empty_update_is_a_true_no_op() {
        let store = memory_store().await;
        store
            .create("t1", "alice", TaskMode::Single, None, None)
            .await
            .unwrap();
        let before = store.get("alice", "t1").await.unwrap().unwrap();

        // Sleeping would prove `updated_at` is untouched, but asserting
        // equality without any delay is sufficient and avoids a flaky sleep.
        store.update("t1", TaskUpdate::default()).await.unwrap();
        let after = store.get("alice", "t1").await.unwrap().unwrap();
        assert_eq!(before.updated_at, after.updated_at);
    }

    #[tokio::test]
    async fn terminal_update_sets_finished_at() {
        let store = memory_store().await;
        store
            .create("t1", "alice", TaskMode::Single, None, None)
            .await
            .unwrap();

        store
            .update(
                "t1",
                TaskUpdate::default()
                    .status(TaskStatus::Completed)
                    .finished_now(),
            )
            .await
            .unwrap();

        let record = store.get("alice", "t1").await.unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert!(record.finished_at.is_some());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_scoped() {
        let store = memory_store().await;
        store
            .create("t1", "alice", TaskMode::Single, None, None)
            .await
            .unwrap();
        store
            .create("t2", "alice", TaskMode::Single, None, None)
            .await
            .unwrap();
        store
            .create("t3", "bob", TaskMode::Single, None, None)
            .await
            .unwrap();

        let records = store.list("alice", 50).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.user_id == "alice"));
    }
}
