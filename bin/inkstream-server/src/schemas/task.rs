use inkstream_core::model::TaskRecord;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct TaskListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub mode: String,
    pub config: Option<serde_json::Value>,
    pub queue_position: Option<i64>,
    pub result_path: Option<String>,
    pub error: Option<String>,
    pub meta: serde_json::Value,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub updated_at: String,
}

impl From<TaskRecord> for TaskResponse {
    fn from(record: TaskRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            status: record.status.as_str().to_owned(),
            mode: record.mode.as_str().to_owned(),
            config: record.config,
            queue_position: record.queue_position,
            result_path: record.result_path,
            error: record.error,
            meta: record.meta,
            created_at: record.created_at.to_rfc3339(),
            started_at: record.started_at.map(|t| t.to_rfc3339()),
            finished_at: record.finished_at.map(|t| t.to_rfc3339()),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}
