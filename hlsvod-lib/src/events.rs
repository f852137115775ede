//! Lifecycle observer hooks.
//!
//! The observer is supplied at construction and must not be swapped while
//! the manager is running. Every method has a no-op default.

use crate::error::VodError;

/// Observer for manager lifecycle transitions
pub trait ManagerEvents: Send + Sync {
    /// Fired once when initialization completes and the manager becomes ready.
    fn on_start(&self) {}

    /// Fired for every log line emitted by the transcode executor.
    fn on_cmd_log(&self, _line: &str) {}

    /// Fired when the manager stops; carries the error if initialization failed.
    fn on_stop(&self, _err: Option<&VodError>) {}
}

/// Default observer that ignores every event
#[derive(Debug, Default)]
pub struct NoopEvents;

impl ManagerEvents for NoopEvents {}
