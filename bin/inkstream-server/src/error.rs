//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inkstream_core::error::CoreError;
use serde_json::json;
use thiserror::Error;

/// All errors that can occur in the inkstream-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the dispatch engine.
    #[error("dispatch error: {0}")]
    Core(#[from] CoreError),

    /// Propagated from the SQLite task store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The image boundary failed to fetch or decode `image`/`images`: a
    /// 4xx at the request boundary, the task is never created.
    #[error("could not decode image: {0}")]
    Decode(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Core(CoreError::ClientGone) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ServerError::Core(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.user_message()),
            ServerError::Database(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Decode(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            ServerError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        ServerError::Internal(e.to_string())
    }
}
