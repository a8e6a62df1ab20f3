//! HTTP-side [`ConnectionProbe`] implementation.
//!
//! The dispatch loop treats liveness as an opaque boundary concern.
//! Streaming responses hold a real signal: the body stream
//! is backed by the receiving half of an `mpsc` channel, so once axum drops
//! that receiver (because the client closed the connection), `Sender::is_closed`
//! flips to `true` with no extra plumbing. Unary and batch responses have no
//! such channel; detecting a mid-request TCP half-close for them would need
//! lower-level hyper integration this boundary layer doesn't attempt, so they
//! report `AlwaysConnected` and rely on the dispatch loop's own terminal
//! progress instead.

use inkstream_core::frame::Frame;
use inkstream_core::queue::ConnectionProbe;
use tokio::sync::mpsc;

#[derive(Clone)]
pub enum HttpConnectionProbe {
    AlwaysConnected,
    Channel(mpsc::Sender<Frame>),
}

impl ConnectionProbe for HttpConnectionProbe {
    async fn is_disconnected(&self) -> bool {
        match self {
            HttpConnectionProbe::AlwaysConnected => false,
            HttpConnectionProbe::Channel(tx) => tx.is_closed(),
        }
    }
}
