//! Task executor: the retry state machine around the processing pipeline.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use podqueue_core::{TaskId, TaskPayload};

use super::observer::{TaskObserver, TracingObserver};
use super::pipeline::{Pipeline, SimulatedPipeline};
use super::types::{
    DEFAULT_ATTEMPT_TIMEOUT, ExecutionRecord, ProcessingError, RetryPolicy, TaskStatus,
    TerminalFailure,
};

/// Executor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub retry_policy: RetryPolicy,
    /// Wall-clock budget for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl ExecutorConfig {
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed_terminal: u64,
    pub attempts_failed: u64,
    pub current_running: usize,
}

/// Runs tasks through the pipeline until they succeed or exhaust their attempts.
///
/// The executor is the only place attempts are counted. Broker delivery
/// metadata is never consulted, so a broker redelivery starts a fresh
/// [`ExecutionRecord`].
pub struct TaskExecutor {
    pipeline: Arc<dyn Pipeline>,
    observer: Arc<dyn TaskObserver>,
    config: ExecutorConfig,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl TaskExecutor {
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        observer: Arc<dyn TaskObserver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            pipeline,
            observer,
            config,
            stats: Arc::new(Mutex::new(ExecutorStats::default())),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Execute one delivery of a task to a terminal state.
    ///
    /// Never returns an error: the outcome lives in the returned record and is
    /// reported through the observer.
    pub async fn execute(&self, task_id: TaskId, payload: TaskPayload) -> ExecutionRecord {
        let mut record = ExecutionRecord::new(task_id, payload, self.config.retry_policy.clone());
        self.update_stats(|s| s.current_running += 1);

        while record.mark_running() {
            let started = Utc::now();
            info!(
                task_id = %record.task_id(),
                attempt = record.attempt_count(),
                max_attempts = record.max_attempts(),
                "starting podcast processing attempt"
            );

            let result = self.run_attempt(&record).await;

            match result {
                Ok(()) => {
                    record.mark_succeeded(started);
                    self.observer.on_completed(&record);
                }
                Err(err) => match record.mark_failed(&err, started) {
                    TaskStatus::FailedRetryable => {
                        self.update_stats(|s| s.attempts_failed += 1);
                        self.observer.on_attempt_failed(&record, &err);

                        let delay = self
                            .config
                            .retry_policy
                            .delay_for_attempt(record.attempt_count());
                        if !delay.is_zero() {
                            debug!(
                                task_id = %record.task_id(),
                                delay_ms = delay.as_millis() as u64,
                                "backing off before retry"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        record.requeue();
                    }
                    _ => {
                        self.update_stats(|s| s.attempts_failed += 1);
                        let failure = TerminalFailure {
                            task_id: record.task_id(),
                            attempts: record.attempt_count(),
                            last_error: err,
                        };
                        self.fire_terminal_hook(&record, &failure);
                    }
                },
            }
        }

        self.update_stats(|s| {
            s.current_running = s.current_running.saturating_sub(1);
            s.tasks_processed += 1;
            match record.status() {
                TaskStatus::Succeeded => s.tasks_succeeded += 1,
                TaskStatus::FailedTerminal => s.tasks_failed_terminal += 1,
                _ => {}
            }
        });

        record
    }

    async fn run_attempt(&self, record: &ExecutionRecord) -> Result<(), ProcessingError> {
        let timeout = self.config.attempt_timeout;
        match tokio::time::timeout(
            timeout,
            self.pipeline.run(record.payload(), record.attempt_count()),
        )
        .await
        {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(ProcessingError::Timeout(timeout)),
        }
    }

    fn fire_terminal_hook(&self, record: &ExecutionRecord, failure: &TerminalFailure) {
        let observer = &self.observer;
        if catch_unwind(AssertUnwindSafe(|| observer.on_terminal_failure(record, failure))).is_err()
        {
            error!(task_id = %record.task_id(), "terminal failure hook panicked");
        }
    }

    fn update_stats(&self, f: impl FnOnce(&mut ExecutorStats)) {
        if let Ok(mut s) = self.stats.lock() {
            f(&mut *s);
        }
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(
            Arc::new(SimulatedPipeline::default()),
            Arc::new(TracingObserver),
            ExecutorConfig::default(),
        )
    }
}
