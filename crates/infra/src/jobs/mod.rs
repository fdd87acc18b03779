//! Background task execution with bounded retries.
//!
//! ## Design
//!
//! - One `ExecutionRecord` per delivery, driven through an explicit state machine
//!   (`Pending → Running → Succeeded | FailedRetryable | FailedTerminal`)
//! - Attempts are counted here, not by the broker
//! - Each attempt is bounded by a timeout; a timeout is a transient failure
//! - Faults are injected through a pluggable `FaultInjector`
//!
//! ## Components
//!
//! - `TaskExecutor`: runs a task to a terminal state
//! - `Pipeline` / `SimulatedPipeline`: the fetch → transform → persist stages
//! - `TaskObserver`: completion and terminal-failure hooks

pub mod executor;
pub mod faults;
pub mod observer;
pub mod pipeline;
pub mod types;

pub use executor::{ExecutorConfig, ExecutorStats, TaskExecutor};
pub use faults::{AlwaysFail, FailFirst, FaultInjector, NoFaults, RandomFaults};
pub use observer::{TaskObserver, TracingObserver};
pub use pipeline::{Pipeline, SimulatedPipeline, Stage, StageDurations, StageOutcome};
pub use types::{
    AttemptRecord, BackoffStrategy, ExecutionRecord, ProcessingError, RetryPolicy, TaskStatus,
    TerminalFailure,
};
