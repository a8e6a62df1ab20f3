//! Executor protocol: what the dispatch loop expects from a translation
//! backend.
//!
//! A request/reply pair for unary work, an `mpsc` channel of notifications
//! for streaming work. The context blob carried on a final-result
//! notification is an opaque value plus externally supplied
//! extractor/transformer functions, so the dispatch loop never needs to
//! know its internal shape.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Opaque payload carried by a final-result notification. The dispatch
/// loop never inspects its contents directly; it only ever calls the
/// caller-supplied [`DebugFolderExtractor`] and [`ResultTransformer`].
#[derive(Debug, Clone)]
pub struct ContextBlob(pub serde_json::Value);

/// Extracts the optional debug-folder attribute from a [`ContextBlob`].
pub type DebugFolderExtractor = Arc<dyn Fn(&ContextBlob) -> Option<String> + Send + Sync>;

/// Turns a [`ContextBlob`] into the user-visible result bytes.
pub type ResultTransformer = Arc<dyn Fn(&ContextBlob) -> Bytes + Send + Sync>;

/// One notification emitted by a streaming executor, interpreted by the
/// dispatch loop's progress-callback contract.
#[derive(Debug, Clone)]
pub enum ExecutorNotification {
    /// Final result (code 0).
    Result(ContextBlob),
    /// Error (code 2).
    Error(String),
    /// Queue-position update (code 3).
    QueuePosition(u64),
    /// Any other code, passed through without store side effects.
    Raw { code: u8, payload: Bytes },
}

/// An external worker able to transform bitmap(s) + config into result
/// bytes, optionally emitting progress (`GLOSSARY`).
///
/// Implementations are checked out from an [`crate::pool::ExecutorPool`]
/// and must not be retained past the call that acquired them.
pub trait Executor: Send + Sync + 'static {
    /// Single-image unary translation. The error string is raw executor
    /// text, classified by the caller via
    /// [`crate::error::classify_executor_error`].
    fn run_unary(
        &self,
        bitmap: Bytes,
        config: serde_json::Value,
    ) -> impl Future<Output = Result<Bytes, String>> + Send;

    /// Batch unary translation, returned the same way as a single result:
    /// one `Bytes` blob.
    fn run_unary_batch(
        &self,
        bitmaps: Vec<Bytes>,
        config: serde_json::Value,
        batch_size: usize,
    ) -> impl Future<Output = Result<Bytes, String>> + Send;

    /// Single-image streaming translation. Progress is reported by sending
    /// [`ExecutorNotification`]s on `notify` as they occur; the final
    /// notification must be `Result` or `Error`.
    fn run_streaming(
        &self,
        bitmap: Bytes,
        config: serde_json::Value,
        notify: mpsc::Sender<ExecutorNotification>,
    ) -> impl Future<Output = Result<(), String>> + Send;

    /// Batch streaming translation; frame shape identical to the single
    /// task case.
    fn run_streaming_batch(
        &self,
        bitmaps: Vec<Bytes>,
        config: serde_json::Value,
        batch_size: usize,
        notify: mpsc::Sender<ExecutorNotification>,
    ) -> impl Future<Output = Result<(), String>> + Send;
}
