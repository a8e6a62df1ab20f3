//! Health / heartbeat endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint.
///
/// Returns `{"status": "ok", "version": "...", "executors": {"free": .., "total": ..}}`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = Value)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "executors": {
            "free": state.pool.free_count(),
            "total": state.pool.total_count(),
        },
        "queued": state.queue.len(),
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use inkstream_core::pool::ExecutorPool;
    use inkstream_core::queue::TaskQueue;
    use inkstream_core::store::sqlite::SqliteTaskStore;
    use inkstream_core::testing::FakeExecutor;

    async fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            config: Arc::new(crate::config::Config::from_env()),
            store: Arc::new(SqliteTaskStore::connect("sqlite::memory:").await.unwrap()),
            queue: Arc::new(TaskQueue::new()),
            pool: Arc::new(ExecutorPool::new([FakeExecutor::new()])),
        })
    }

    #[tokio::test]
    async fn health_response_has_ok_status() {
        let Json(body) = get_health(State(test_state().await)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["executors"]["total"], 1);
    }
}
