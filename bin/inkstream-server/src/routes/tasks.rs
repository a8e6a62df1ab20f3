//! Task introspection endpoints: list and get only. There is no
//! operator-initiated cancel; cancellation is client-disconnect-only.

use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use utoipa::OpenApi;

use inkstream_core::store::TaskStore;

use crate::error::ServerError;
use crate::identity::resolve_user_id;
use crate::schemas::task::{TaskListQuery, TaskResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_tasks, get_task), components(schemas(TaskResponse, TaskListQuery)))]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
}

/// List tasks belonging to the caller, newest first.
#[utoipa::path(
    get,
    path = "/v1/tasks",
    tag = "tasks",
    params(TaskListQuery),
    responses(
        (status = 200, description = "Tasks listed", body = [TaskResponse]),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(q): Query<TaskListQuery>,
) -> Result<Json<Vec<TaskResponse>>, ServerError> {
    let user_id = resolve_user_id(&headers, Some(peer));
    let records = state.store.list(&user_id, q.limit).await?;
    Ok(Json(records.into_iter().map(TaskResponse::from).collect()))
}

/// Fetch a single task, scoped to the caller's user-id. Never returns
/// another user's record.
#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    params(("id" = String, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task retrieved", body = TaskResponse),
        (status = 404, description = "Task not found"),
        (status = 500, description = "Backend error"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ServerError> {
    let user_id = resolve_user_id(&headers, Some(peer));
    let record = state
        .store
        .get(&user_id, &id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("task {id} not found")))?;
    Ok(Json(TaskResponse::from(record)))
}
