//! Admission, queueing, dispatch, and progress-streaming engine core.
//!
//! Four collaborating components:
//!
//! - [`store`]: durable task-record CRUD.
//! - [`pool`]: fair, bounded checkout of executor handles.
//! - [`queue`]: the ordered admission queue with disconnect reaping.
//! - [`dispatch`]: the per-item state machine tying the above together,
//!   exposed as [`dispatch::dispatch_unary`] and
//!   [`dispatch::dispatch_streaming`].
//!
//! [`model`], [`error`], [`frame`], and [`executor`] are the shared types
//! those components speak in.

pub mod dispatch;
pub mod error;
pub mod executor;
pub mod frame;
pub mod model;
pub mod pool;
pub mod queue;
pub mod store;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
