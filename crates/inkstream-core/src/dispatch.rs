//! Dispatch & stream loop: the heart of the system.
//!
//! One invocation serves one queue item until terminal state. The
//! "optional notify callback" idea is re-modelled as two public entry
//! points, [`dispatch_unary`] and [`dispatch_streaming`], that share one
//! inner state machine, [`run_dispatch`], discriminated by whether a
//! [`StreamingSink`] is present.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{classify_executor_error, CoreError};
use crate::executor::{DebugFolderExtractor, Executor, ExecutorNotification, ResultTransformer};
use crate::frame::{Frame, FrameCode};
use crate::model::{TaskStatus, TaskUpdate};
use crate::pool::ExecutorPool;
use crate::queue::{BitmapHandle, ConnectionProbe, QueueItem, TaskQueue};
use crate::store::TaskStore;

pub use crate::queue::DispatchInput;

/// Presence of this sink switches the dispatch loop into streaming mode.
pub struct StreamingSink {
    pub frame_tx: mpsc::Sender<Frame>,
    pub debug_folder_extractor: DebugFolderExtractor,
    pub result_transformer: ResultTransformer,
}

/// Serve `item` to completion, returning the unary result bytes.
///
/// Errors surfaced here always mean the task record has already been
/// written to a terminal state.
pub async fn dispatch_unary<P, E, S>(
    item: QueueItem<P>,
    config: serde_json::Value,
    queue: Arc<TaskQueue<P>>,
    pool: Arc<ExecutorPool<E>>,
    store: Arc<S>,
) -> Result<Bytes, CoreError>
where
    P: ConnectionProbe,
    E: Executor,
    S: TaskStore,
{
    match run_dispatch(item, config, &queue, &pool, &*store, None).await? {
        Some(bytes) => Ok(bytes),
        None => unreachable!("unary dispatch always yields bytes on success"),
    }
}

/// Serve `item` to completion, emitting frames onto `sink.frame_tx` as they
/// occur. Returns once the stream has terminated (success, failure, or
/// cancellation); the caller never receives a value, since the result was
/// already delivered incrementally as frames.
pub async fn dispatch_streaming<P, E, S>(
    item: QueueItem<P>,
    config: serde_json::Value,
    queue: Arc<TaskQueue<P>>,
    pool: Arc<ExecutorPool<E>>,
    store: Arc<S>,
    sink: StreamingSink,
) -> Result<(), CoreError>
where
    P: ConnectionProbe,
    E: Executor,
    S: TaskStore,
{
    run_dispatch(item, config, &queue, &pool, &*store, Some(sink)).await?;
    Ok(())
}

async fn run_dispatch<P, E, S>(
    mut item: QueueItem<P>,
    config: serde_json::Value,
    queue: &TaskQueue<P>,
    pool: &ExecutorPool<E>,
    store: &S,
    mut streaming: Option<StreamingSink>,
) -> Result<Option<Bytes>, CoreError>
where
    P: ConnectionProbe,
    E: Executor,
    S: TaskStore,
{
    loop {
        let Some(pos) = queue.position_of(&item.task_id) else {
            return terminate_as_gone(store, &item.task_id, streaming.as_ref()).await;
        };

        if let Some(sink) = &streaming {
            let _ = sink.frame_tx.send(Frame::queue_position(pos as u64)).await;
        }
        store
            .update(&item.task_id, TaskUpdate::default().queue_position(pos as i64))
            .await?;

        // Register both waiters before reading `free_count()`: a release
        // or a queue change landing between the read and the `select!`
        // below would otherwise go unnoticed until something else happens
        // to wake this task (or forever, if nothing does).
        let queue_changed = queue.wait_for_change();
        let pool_released = pool.wait_for_release();
        tokio::pin!(queue_changed, pool_released);
        queue_changed.as_mut().enable();
        pool_released.as_mut().enable();

        let free = pool.free_count();
        if pos >= free {
            // Either the queue changing (an item ahead reaped/removed) or
            // the pool freeing up (an executor released) can admit this
            // item; wait on whichever fires first.
            tokio::select! {
                _ = queue_changed.as_mut() => {},
                _ = pool_released.as_mut() => {},
            }
            continue;
        }

        if item.probe.is_disconnected().await {
            queue.reap_disconnected().await;
            return terminate_as_gone(store, &item.task_id, streaming.as_ref()).await;
        }

        let executor = pool.acquire().await;
        queue.remove(&item.task_id);
        store
            .update(
                &item.task_id,
                TaskUpdate::default()
                    .status(TaskStatus::Processing)
                    .started_now()
                    .queue_position(0),
            )
            .await?;

        if let Some(sink) = &streaming {
            let _ = sink.frame_tx.send(Frame::dispatch_begun()).await;
        }

        let input = item.bitmap;
        return run_executor(
            executor,
            &item.task_id,
            &item.user_id,
            input,
            config,
            store,
            streaming.take(),
        )
        .await;
    }
}

/// A disconnected/reaped item terminates the loop.
async fn terminate_as_gone<S: TaskStore>(
    store: &S,
    task_id: &str,
    streaming: Option<&StreamingSink>,
) -> Result<Option<Bytes>, CoreError> {
    match streaming {
        Some(_) => {
            store
                .update(
                    task_id,
                    TaskUpdate::default().status(TaskStatus::Cancelled).finished_now(),
                )
                .await?;
            Ok(None)
        }
        None => Err(CoreError::ClientGone),
    }
}

/// Invoke the executor and drive the task record to a terminal state.
/// `executor` is consumed here; its `Drop` guarantees release back to the
/// pool on every exit path, including the spawned-task path below.
async fn run_executor<E, S>(
    executor: crate::pool::PooledExecutor<E>,
    task_id: &str,
    user_id: &str,
    input: DispatchInput,
    config: serde_json::Value,
    store: &S,
    streaming: Option<StreamingSink>,
) -> Result<Option<Bytes>, CoreError>
where
    E: Executor,
    S: TaskStore,
{
    match streaming {
        None => run_unary(executor, task_id, input, config, store).await,
        Some(sink) => run_streaming(executor, task_id, user_id, input, config, store, sink).await,
    }
}

/// [`DispatchInput`] with every [`BitmapHandle`] resolved to bytes, ready
/// to hand to an [`Executor`].
enum LoadedPayload {
    Single(Bytes),
    Batch { images: Vec<Bytes>, batch_size: usize },
}

fn load_bitmap(handle: BitmapHandle) -> Result<Bytes, CoreError> {
    handle.load().map_err(|e| CoreError::BitmapUnavailable(e.to_string()))
}

fn load_payload(input: DispatchInput) -> Result<LoadedPayload, CoreError> {
    match input {
        DispatchInput::Single(handle) => Ok(LoadedPayload::Single(load_bitmap(handle)?)),
        DispatchInput::Batch { images, batch_size } => {
            let images = images.into_iter().map(load_bitmap).collect::<Result<Vec<_>, _>>()?;
            Ok(LoadedPayload::Batch { images, batch_size })
        }
    }
}

async fn run_unary<E, S>(
    executor: crate::pool::PooledExecutor<E>,
    task_id: &str,
    input: DispatchInput,
    config: serde_json::Value,
    store: &S,
) -> Result<Option<Bytes>, CoreError>
where
    E: Executor,
    S: TaskStore,
{
    let payload = match load_payload(input) {
        Ok(payload) => payload,
        Err(err) => {
            drop(executor);
            store
                .update(
                    task_id,
                    TaskUpdate::default()
                        .status(TaskStatus::Failed)
                        .error(err.user_message())
                        .finished_now(),
                )
                .await?;
            return Err(err);
        }
    };

    let result = match payload {
        LoadedPayload::Single(bitmap) => executor.run_unary(bitmap, config).await,
        LoadedPayload::Batch { images, batch_size } => {
            executor.run_unary_batch(images, config, batch_size).await
        }
    };
    drop(executor);

    match result {
        Ok(bytes) => {
            store
                .update(
                    task_id,
                    TaskUpdate::default().status(TaskStatus::Completed).finished_now(),
                )
                .await?;
            Ok(Some(bytes))
        }
        Err(raw) => {
            let err = classify_executor_error(&raw);
            store
                .update(
                    task_id,
                    TaskUpdate::default()
                        .status(TaskStatus::Failed)
                        .error(err.user_message())
                        .finished_now(),
                )
                .await?;
            Err(err)
        }
    }
}

async fn run_streaming<E, S>(
    executor: crate::pool::PooledExecutor<E>,
    task_id: &str,
    user_id: &str,
    input: DispatchInput,
    config: serde_json::Value,
    store: &S,
    sink: StreamingSink,
) -> Result<Option<Bytes>, CoreError>
where
    E: Executor,
    S: TaskStore,
{
    let payload = match load_payload(input) {
        Ok(payload) => payload,
        Err(err) => {
            drop(executor);
            let _ = sink.frame_tx.send(Frame::error(err.user_message())).await;
            store
                .update(
                    task_id,
                    TaskUpdate::default()
                        .status(TaskStatus::Failed)
                        .error(err.user_message())
                        .finished_now(),
                )
                .await?;
            return Err(err);
        }
    };

    let (tx, mut rx) = mpsc::channel::<ExecutorNotification>(32);

    // Driven on its own task so the channel is polled concurrently with
    // the executor producing notifications on it; `executor` is moved in,
    // so its RAII release fires the moment this task finishes regardless
    // of outcome.
    let handle = tokio::spawn(async move {
        match payload {
            LoadedPayload::Single(bitmap) => executor.run_streaming(bitmap, config, tx).await,
            LoadedPayload::Batch { images, batch_size } => {
                executor.run_streaming_batch(images, config, batch_size, tx).await
            }
        }
    });

    let mut saw_terminal = false;
    while let Some(notification) = rx.recv().await {
        if matches!(
            notification,
            ExecutorNotification::Result(_) | ExecutorNotification::Error(_)
        ) {
            saw_terminal = true;
        }
        handle_notification(task_id, user_id, notification, &sink, store).await?;
    }

    let exec_result = handle
        .await
        .map_err(|e| CoreError::ExecutorOther(format!("executor task panicked: {e}")))?;

    if let Err(raw) = exec_result {
        if !saw_terminal {
            let err = classify_executor_error(&raw);
            let _ = sink.frame_tx.send(Frame::error(err.user_message())).await;
            store
                .update(
                    task_id,
                    TaskUpdate::default()
                        .status(TaskStatus::Failed)
                        .error(err.user_message())
                        .finished_now(),
                )
                .await?;
            return Err(err);
        }
    }

    Ok(None)
}

async fn handle_notification<S: TaskStore>(
    task_id: &str,
    user_id: &str,
    notification: ExecutorNotification,
    sink: &StreamingSink,
    store: &S,
) -> Result<(), CoreError> {
    match notification {
        ExecutorNotification::Result(blob) => {
            let debug_folder = (sink.debug_folder_extractor)(&blob);
            let mut update = TaskUpdate::default().status(TaskStatus::Completed).finished_now();
            if let Some(folder) = &debug_folder {
                update = update.result_path(folder.clone());
                let existing_meta = store
                    .get(user_id, task_id)
                    .await?
                    .map(|r| r.meta)
                    .unwrap_or_else(|| serde_json::json!({}));
                update = update.meta(merge_json(existing_meta, serde_json::json!({ "debug_folder": folder })));
            }
            store.update(task_id, update).await?;

            let bytes = (sink.result_transformer)(&blob);
            let _ = sink.frame_tx.send(Frame::result(bytes)).await;
        }
        ExecutorNotification::Error(message) => {
            store
                .update(
                    task_id,
                    TaskUpdate::default()
                        .status(TaskStatus::Failed)
                        .error(message.clone())
                        .finished_now(),
                )
                .await?;
            let _ = sink.frame_tx.send(Frame::error(message)).await;
        }
        ExecutorNotification::QueuePosition(pos) => {
            store
                .update(task_id, TaskUpdate::default().queue_position(pos as i64))
                .await?;
            let _ = sink.frame_tx.send(Frame::queue_position(pos)).await;
        }
        ExecutorNotification::Raw { code, payload } => {
            if let Some(frame_code) = FrameCode::from_u8(code) {
                let _ = sink.frame_tx.send(Frame { code: frame_code, payload }).await;
            }
        }
    }
    Ok(())
}

fn merge_json(base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(patch_map)) => {
            base_map.extend(patch_map);
            serde_json::Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}
