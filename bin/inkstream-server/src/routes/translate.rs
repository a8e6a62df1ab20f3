//! Translate endpoints: the thin request-extraction boundary that builds a
//! queue item, decodes the image source, and drives the dispatch loop to
//! completion, split into unary, streaming, and batch handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;

use inkstream_core::dispatch::{dispatch_streaming, dispatch_unary, DispatchInput, StreamingSink};
use inkstream_core::model::TaskMode;
use inkstream_core::queue::QueueItem;
use inkstream_core::store::TaskStore;
use inkstream_core::testing::fake_result_transformer;

use crate::error::ServerError;
use crate::identity::resolve_user_id;
use crate::image_source::ImageSource;
use crate::probe::HttpConnectionProbe;
use crate::schemas::translate::{TranslateBatchRequest, TranslateRequest};
use crate::state::AppState;

const X_TASK_ID: &str = "x-task-id";

#[derive(OpenApi)]
#[openapi(
    paths(translate_unary, translate_stream, translate_batch),
    components(schemas(TranslateRequest, TranslateBatchRequest))
)]
pub struct TranslateApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/translate", post(translate_unary))
        .route("/translate/stream", post(translate_stream))
        .route("/translate/batch", post(translate_batch))
}

/// Unary translation (`POST /v1/translate`).
#[utoipa::path(
    post,
    path = "/v1/translate",
    tag = "translate",
    request_body = TranslateRequest,
    responses(
        (status = 200, description = "Translated image bytes"),
        (status = 422, description = "Image could not be decoded"),
        (status = 500, description = "Translation failed"),
    )
)]
pub async fn translate_unary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<TranslateRequest>,
) -> Result<Response, ServerError> {
    let user_id = resolve_user_id(&headers, Some(peer));
    let bitmap = ImageSource::classify(&req.image)
        .resolve(state.config.bitmap_spool_threshold_bytes)
        .await?;

    let task_id = Uuid::new_v4().to_string();
    state
        .store
        .create(&task_id, &user_id, TaskMode::Single, Some(req.config.clone()), None)
        .await?;

    let probe = HttpConnectionProbe::AlwaysConnected;
    state.queue.enqueue(task_id.clone(), user_id.clone(), probe.clone());

    info!(task_id = %task_id, %user_id, "unary translate task admitted");

    let bytes = dispatch_unary(
        QueueItem::new(task_id.clone(), user_id, probe, DispatchInput::Single(bitmap)),
        req.config,
        state.queue.clone(),
        state.pool.clone(),
        state.store.clone(),
    )
    .await?;

    Ok(unary_response(&task_id, bytes))
}

/// Streaming translation (`POST /v1/translate/stream`). Response is a
/// chunked `application/octet-stream` body composed of [`inkstream_core::frame::Frame`]s.
#[utoipa::path(
    post,
    path = "/v1/translate/stream",
    tag = "translate",
    request_body = TranslateRequest,
    responses(
        (status = 200, description = "Chunked frame stream"),
        (status = 422, description = "Image could not be decoded"),
    )
)]
pub async fn translate_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<TranslateRequest>,
) -> Result<Response, ServerError> {
    let user_id = resolve_user_id(&headers, Some(peer));
    let bitmap = ImageSource::classify(&req.image)
        .resolve(state.config.bitmap_spool_threshold_bytes)
        .await?;

    let task_id = Uuid::new_v4().to_string();
    state
        .store
        .create(&task_id, &user_id, TaskMode::Stream, Some(req.config.clone()), None)
        .await?;

    let (frame_tx, frame_rx) = mpsc::channel(32);
    let probe = HttpConnectionProbe::Channel(frame_tx.clone());
    state.queue.enqueue(task_id.clone(), user_id.clone(), probe.clone());

    info!(task_id = %task_id, %user_id, "streaming translate task admitted");

    let sink = StreamingSink {
        frame_tx,
        debug_folder_extractor: Arc::new(|_| None),
        result_transformer: Arc::new(fake_result_transformer),
    };

    let queue = state.queue.clone();
    let pool = state.pool.clone();
    let store = state.store.clone();
    let item = QueueItem::new(task_id.clone(), user_id, probe, DispatchInput::Single(bitmap));
    tokio::spawn(async move {
        let _ = dispatch_streaming(item, req.config, queue, pool, store, sink).await;
    });

    let body_stream = ReceiverStream::new(frame_rx).map(|frame| Ok::<Bytes, std::io::Error>(frame.encode()));

    let mut response = Response::new(Body::from_stream(body_stream));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    insert_task_id_header(&mut response, &task_id);
    Ok(response)
}

/// Batch translation (`POST /v1/translate/batch`). Returned like a single
/// unary result: one `Bytes` blob covering the whole batch.
#[utoipa::path(
    post,
    path = "/v1/translate/batch",
    tag = "translate",
    request_body = TranslateBatchRequest,
    responses(
        (status = 200, description = "Translated batch bytes"),
        (status = 422, description = "An image in the batch could not be decoded"),
        (status = 500, description = "Translation failed"),
    )
)]
pub async fn translate_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Json(req): Json<TranslateBatchRequest>,
) -> Result<Response, ServerError> {
    if req.images.is_empty() {
        return Err(ServerError::BadRequest("images must not be empty".into()));
    }
    let user_id = resolve_user_id(&headers, Some(peer));

    let mut bitmaps = Vec::with_capacity(req.images.len());
    for raw in &req.images {
        bitmaps.push(
            ImageSource::classify(raw)
                .resolve(state.config.bitmap_spool_threshold_bytes)
                .await?,
        );
    }

    let task_id = Uuid::new_v4().to_string();
    let meta = serde_json::json!({
        "total_images": bitmaps.len(),
        "batch_size": req.batch_size,
    });
    state
        .store
        .create(&task_id, &user_id, TaskMode::Batch, Some(req.config.clone()), Some(meta))
        .await?;

    let probe = HttpConnectionProbe::AlwaysConnected;
    state.queue.enqueue(task_id.clone(), user_id.clone(), probe.clone());

    info!(task_id = %task_id, %user_id, images = bitmaps.len(), "batch translate task admitted");

    let input = DispatchInput::Batch { images: bitmaps, batch_size: req.batch_size };
    let bytes = dispatch_unary(
        QueueItem::new(task_id.clone(), user_id, probe, input),
        req.config,
        state.queue.clone(),
        state.pool.clone(),
        state.store.clone(),
    )
    .await?;

    Ok(unary_response(&task_id, bytes))
}

fn unary_response(task_id: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes));
    response
        .headers_mut()
        .insert(axum::http::header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    insert_task_id_header(&mut response, task_id);
    response.into_response()
}

fn insert_task_id_header(response: &mut Response, task_id: &str) {
    if let Ok(value) = HeaderValue::from_str(task_id) {
        response.headers_mut().insert(X_TASK_ID, value);
    }
}
