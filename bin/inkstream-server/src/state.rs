//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use inkstream_core::pool::ExecutorPool;
use inkstream_core::queue::TaskQueue;
use inkstream_core::store::sqlite::SqliteTaskStore;
use inkstream_core::testing::FakeExecutor;

use crate::config::Config;
use crate::probe::HttpConnectionProbe;

/// State shared across all HTTP handlers.
///
/// `pool`'s executor type is [`FakeExecutor`]: a real translation backend
/// is an external collaborator outside this system's scope, and the core
/// treats the executor purely as an interface it consumes. The server runs
/// against the reference implementation the core ships behind its
/// `testing` feature.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteTaskStore>,
    pub queue: Arc<TaskQueue<HttpConnectionProbe>>,
    pub pool: Arc<ExecutorPool<FakeExecutor>>,
}
