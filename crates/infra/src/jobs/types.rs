//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use podqueue_core::{TaskId, TaskPayload};

/// Default number of attempts a task gets before it fails for good.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default wall-clock budget for one attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Task execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for the next attempt
    Pending,
    /// An attempt is in flight
    Running,
    /// Pipeline completed
    Succeeded,
    /// Attempt failed, another attempt is allowed
    FailedRetryable,
    /// Attempts exhausted, never retried automatically
    FailedTerminal,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::FailedTerminal)
    }
}

/// A recoverable pipeline fault. Counts toward the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessingError {
    #[error("transient processing error in {stage}: {message}")]
    Transient { stage: &'static str, message: String },

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl ProcessingError {
    pub fn transient(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Transient {
            stage,
            message: message.into(),
        }
    }
}

/// Retries exhausted. Handed to the failure hook only; never returned to a submitter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task {task_id} failed after {attempts} attempts: {last_error}")]
pub struct TerminalFailure {
    pub task_id: TaskId,
    pub attempts: u32,
    pub last_error: ProcessingError,
}

/// Backoff strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    #[default]
    Fixed,
    /// Exponential backoff: base * 2^(attempt-1)
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included
    pub max_attempts: u32,
    /// Base delay between attempts
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, Duration::ZERO)
    }
}

impl RetryPolicy {
    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Create a policy with exponential backoff.
    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before the attempt that follows failed attempt `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => self
                .base_delay
                .saturating_mul(2_u32.saturating_pow(attempt - 1)),
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };

        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Record of one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Execution bookkeeping for one delivery of a task.
///
/// Created when a delivery is dequeued and dropped once it reaches
/// `Succeeded` or `FailedTerminal`. A redelivery of the same task gets a fresh
/// record, so attempt counts never leak between deliveries.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    task_id: TaskId,
    payload: TaskPayload,
    attempt_count: u32,
    retry_policy: RetryPolicy,
    status: TaskStatus,
    history: Vec<AttemptRecord>,
}

impl ExecutionRecord {
    pub fn new(task_id: TaskId, payload: TaskPayload, retry_policy: RetryPolicy) -> Self {
        Self {
            task_id,
            payload,
            attempt_count: 0,
            retry_policy,
            status: TaskStatus::Pending,
            history: Vec::new(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_policy.max_attempts
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    /// Pending → Running.
    ///
    /// Returns `false` (and changes nothing) if the record is not pending or
    /// the attempt budget is already spent.
    pub fn mark_running(&mut self) -> bool {
        if self.status != TaskStatus::Pending || !self.retry_policy.should_retry(self.attempt_count)
        {
            return false;
        }
        self.attempt_count += 1;
        self.status = TaskStatus::Running;
        true
    }

    /// Running → Succeeded.
    pub fn mark_succeeded(&mut self, started_at: DateTime<Utc>) {
        self.push_history(started_at, None);
        self.status = TaskStatus::Succeeded;
    }

    /// Running → FailedRetryable or FailedTerminal, depending on the remaining budget.
    pub fn mark_failed(
        &mut self,
        error: &ProcessingError,
        started_at: DateTime<Utc>,
    ) -> TaskStatus {
        self.push_history(started_at, Some(error.to_string()));
        self.status = if self.retry_policy.should_retry(self.attempt_count) {
            TaskStatus::FailedRetryable
        } else {
            TaskStatus::FailedTerminal
        };
        self.status
    }

    /// FailedRetryable → Pending, ready for the next attempt.
    pub fn requeue(&mut self) -> bool {
        if self.status != TaskStatus::FailedRetryable {
            return false;
        }
        self.status = TaskStatus::Pending;
        true
    }

    /// Total time spent inside attempts, in milliseconds.
    pub fn total_duration_ms(&self) -> u64 {
        self.history.iter().map(|a| a.duration_ms).sum()
    }

    fn push_history(&mut self, started_at: DateTime<Utc>, error: Option<String>) {
        let now = Utc::now();
        self.history.push(AttemptRecord {
            attempt: self.attempt_count,
            started_at,
            finished_at: now,
            error,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TaskPayload {
        TaskPayload::new("T", "https://example.com/a.mp3").unwrap()
    }

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let policy =
            RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy::exponential(50, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(30));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            strategy: BackoffStrategy::Linear,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn default_policy_allows_three_attempts() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn record_lifecycle_success() {
        let mut record = ExecutionRecord::new(TaskId::new(), payload(), RetryPolicy::default());
        assert_eq!(record.status(), TaskStatus::Pending);
        assert_eq!(record.attempt_count(), 0);

        assert!(record.mark_running());
        assert_eq!(record.status(), TaskStatus::Running);
        assert_eq!(record.attempt_count(), 1);

        record.mark_succeeded(Utc::now());
        assert_eq!(record.status(), TaskStatus::Succeeded);
        assert!(record.status().is_terminal());
        assert_eq!(record.history().len(), 1);
        assert!(record.history()[0].succeeded());
    }

    #[test]
    fn record_fails_terminally_on_last_attempt() {
        let err = ProcessingError::transient("persist_metadata", "boom");
        let policy = RetryPolicy::fixed(2, Duration::ZERO);
        let mut record = ExecutionRecord::new(TaskId::new(), payload(), policy);

        record.mark_running();
        assert_eq!(record.mark_failed(&err, Utc::now()), TaskStatus::FailedRetryable);
        assert!(record.requeue());

        record.mark_running();
        assert_eq!(record.mark_failed(&err, Utc::now()), TaskStatus::FailedTerminal);
        assert!(!record.requeue());
        assert!(!record.mark_running());
        assert_eq!(record.attempt_count(), 2);
    }

    #[test]
    fn running_requires_pending() {
        let mut record = ExecutionRecord::new(TaskId::new(), payload(), RetryPolicy::default());
        assert!(record.mark_running());
        assert!(!record.mark_running());
        assert_eq!(record.attempt_count(), 1);
    }

    #[test]
    fn record_budget_follows_retry_policy() {
        let err = ProcessingError::transient("fetch", "boom");
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            strategy: BackoffStrategy::Linear,
        };
        let mut record = ExecutionRecord::new(TaskId::new(), payload(), policy.clone());

        for attempt in 1..=4 {
            assert!(record.mark_running());
            let status = record.mark_failed(&err, Utc::now());
            assert_eq!(status == TaskStatus::FailedRetryable, policy.should_retry(attempt));
            record.requeue();
        }
        assert_eq!(record.status(), TaskStatus::FailedTerminal);
        assert_eq!(record.max_attempts(), 4);
        assert_eq!(record.history().len(), 4);
    }
}
