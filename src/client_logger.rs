//! Logging trait for aria client operations.
//!
//! This module provides the [`ClientLogger`] trait that allows users to capture
//! and log the traffic passing through the [`AriaClient`](crate::AriaClient).

/// A trait for logging aria client operations.
///
/// # Example
///
/// ```rust,ignore
/// use aria_chat::ClientLogger;
/// use std::sync::Mutex;
///
/// struct FileLogger {
///     file: Mutex<std::fs::File>,
/// }
///
/// impl ClientLogger for FileLogger {
///     fn log_request(&self, method: &str, path: &str) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "{method} {path}").unwrap();
///     }
///
///     fn log_stream_chunk(&self, session_id: &str, delta: &str) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "[{session_id}] +{}", delta.len()).unwrap();
///     }
///
///     fn log_stream_complete(&self, session_id: &str, text: &str) {
///         let mut file = self.file.lock().unwrap();
///         writeln!(file, "[{session_id}] done: {text}").unwrap();
///     }
/// }
/// ```
pub trait ClientLogger: Send + Sync {
    /// Log a request as it is sent.
    fn log_request(&self, method: &str, path: &str);

    /// Log one decoded chunk of a streamed reply.
    ///
    /// Called in arrival order, after the chunk handler passed to
    /// `send_message` has returned.
    fn log_stream_chunk(&self, session_id: &str, delta: &str);

    /// Log the full text of a reply once its stream has ended.
    fn log_stream_complete(&self, session_id: &str, text: &str);
}

/// Forwards client traffic to `tracing` at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLogger;

impl ClientLogger for TraceLogger {
    fn log_request(&self, method: &str, path: &str) {
        tracing::trace!(method, path, "request");
    }

    fn log_stream_chunk(&self, session_id: &str, delta: &str) {
        tracing::trace!(session_id, bytes = delta.len(), "stream chunk");
    }

    fn log_stream_complete(&self, session_id: &str, text: &str) {
        tracing::trace!(session_id, bytes = text.len(), "stream complete");
    }
}
