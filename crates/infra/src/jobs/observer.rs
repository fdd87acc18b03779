//! Lifecycle hooks fired by the executor.

use tracing::{error, info, warn};

use super::types::{ExecutionRecord, ProcessingError, TerminalFailure};

/// Receives task lifecycle events.
///
/// Hooks return `()`: nothing an observer does can change the outcome of a
/// task. The executor also contains panics raised by the terminal-failure hook.
pub trait TaskObserver: Send + Sync {
    /// An attempt failed and another one will follow.
    fn on_attempt_failed(&self, _record: &ExecutionRecord, _error: &ProcessingError) {}

    /// The pipeline completed.
    fn on_completed(&self, record: &ExecutionRecord);

    /// Attempts are exhausted. Fired exactly once per execution record.
    fn on_terminal_failure(&self, record: &ExecutionRecord, failure: &TerminalFailure);
}

/// Emits structured `tracing` events for every hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl TaskObserver for TracingObserver {
    fn on_attempt_failed(&self, record: &ExecutionRecord, error: &ProcessingError) {
        warn!(
            task_id = %record.task_id(),
            title = record.payload().title(),
            url = record.payload().url(),
            attempt = record.attempt_count(),
            max_attempts = record.max_attempts(),
            error = %error,
            "podcast processing attempt failed; will retry"
        );
    }

    fn on_completed(&self, record: &ExecutionRecord) {
        info!(
            task_id = %record.task_id(),
            title = record.payload().title(),
            url = record.payload().url(),
            attempts = record.attempt_count(),
            duration_ms = record.total_duration_ms(),
            "podcast processed"
        );
    }

    fn on_terminal_failure(&self, record: &ExecutionRecord, failure: &TerminalFailure) {
        error!(
            task_id = %record.task_id(),
            title = record.payload().title(),
            url = record.payload().url(),
            attempts = failure.attempts,
            error = %failure.last_error,
            "podcast processing failed permanently after all attempts"
        );
    }
}
