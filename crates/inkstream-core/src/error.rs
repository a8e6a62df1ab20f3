//! Error taxonomy for the dispatch engine.
//!
//! Errors are grouped by effect, not by source type, so that callers at the
//! HTTP boundary can map them onto status codes without inspecting strings.

use thiserror::Error;

/// All errors the dispatch engine can surface to a caller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The queue item's client disconnected before or during dispatch.
    #[error("User is no longer connected")]
    ClientGone,

    /// The executor reported an error classified as a transient
    /// startup/connection failure.
    #[error("Translation service is starting up, please wait a moment and try again.")]
    ExecutorStartup,

    /// The executor reported any other error.
    #[error("Translation failed: {0}")]
    ExecutorOther(String),

    /// Propagated from the task store; fatal to the calling request.
    #[error("task store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A queued bitmap's backing resource (e.g. a disk-backed handle)
    /// could not be read at dispatch time.
    #[error("could not load bitmap: {0}")]
    BitmapUnavailable(String),
}

impl CoreError {
    /// The exact user-facing message written into `TaskRecord::error` and,
    /// for streaming tasks, framed as a code-2 payload. The store and the
    /// wire frame always agree because both read this one method.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::ClientGone => self.to_string(),
            CoreError::ExecutorStartup => self.to_string(),
            CoreError::ExecutorOther(_) => self.to_string(),
            CoreError::Store(e) => e.to_string(),
            CoreError::BitmapUnavailable(_) => self.to_string(),
        }
    }
}

/// Substrings that classify an executor error as a transient startup
/// failure rather than a generic failure. Kept as a table, not a single
/// hard-coded branch, so new transient-failure signatures are a one-line
/// change.
const STARTUP_ERROR_MARKERS: &[&str] = &["Cannot connect to host", "Connection refused"];

/// Classify a raw executor error string into a [`CoreError`].
///
/// Substring matching is coarse but cheap, and the marker list is the
/// single point of change if new transient-failure signatures need to be
/// recognised.
pub fn classify_executor_error(raw: &str) -> CoreError {
    if STARTUP_ERROR_MARKERS.iter().any(|marker| raw.contains(marker)) {
        CoreError::ExecutorStartup
    } else {
        CoreError::ExecutorOther(raw.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connect_failures_as_startup() {
        assert!(matches!(
            classify_executor_error("Cannot connect to host 'gpu-1:9000'"),
            CoreError::ExecutorStartup
        ));
        assert!(matches!(
            classify_executor_error("Connection refused (os error 111)"),
            CoreError::ExecutorStartup
        ));
    }

    #[test]
    fn classifies_other_errors_as_generic() {
        match classify_executor_error("model weights corrupted") {
            CoreError::ExecutorOther(msg) => assert_eq!(msg, "model weights corrupted"),
            other => panic!("expected ExecutorOther, got {other:?}"),
        }
    }

    #[test]
    fn user_message_matches_spec_text() {
        assert_eq!(
            CoreError::ExecutorStartup.user_message(),
            "Translation service is starting up, please wait a moment and try again."
        );
        assert_eq!(
            CoreError::ExecutorOther("boom".into()).user_message(),
            "Translation failed: boom"
        );
        assert_eq!(CoreError::ClientGone.user_message(), "User is no longer connected");
    }
}
