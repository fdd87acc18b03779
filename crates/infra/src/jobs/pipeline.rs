//! The simulated podcast processing pipeline: fetch, transform, persist metadata.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::info;

use podqueue_core::TaskPayload;

use super::faults::{FaultInjector, RandomFaults};
use super::types::ProcessingError;

/// Named pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Transform,
    PersistMetadata,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Fetch, Stage::Transform, Stage::PersistMetadata];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::PersistMetadata => "persist_metadata",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stage reports when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub elapsed: Duration,
}

/// Runs one attempt of the processing work for a payload.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(
        &self,
        payload: &TaskPayload,
        attempt: u32,
    ) -> Result<Vec<StageOutcome>, ProcessingError>;
}

/// Simulated duration of each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDurations {
    pub fetch: Duration,
    pub transform: Duration,
    pub persist_metadata: Duration,
}

impl StageDurations {
    /// No waiting at all; for tests.
    pub fn zero() -> Self {
        Self::uniform(Duration::ZERO)
    }

    pub fn uniform(d: Duration) -> Self {
        Self {
            fetch: d,
            transform: d,
            persist_metadata: d,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Fetch => self.fetch,
            Stage::Transform => self.transform,
            Stage::PersistMetadata => self.persist_metadata,
        }
    }
}

impl Default for StageDurations {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(3),
            transform: Duration::from_secs(4),
            persist_metadata: Duration::from_secs(3),
        }
    }
}

/// Sleeps through each stage and asks the fault injector whether to fail.
#[derive(Clone)]
pub struct SimulatedPipeline {
    durations: StageDurations,
    faults: Arc<dyn FaultInjector>,
}

impl SimulatedPipeline {
    pub fn new(durations: StageDurations, faults: Arc<dyn FaultInjector>) -> Self {
        Self { durations, faults }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        payload: &TaskPayload,
        attempt: u32,
    ) -> Result<StageOutcome, ProcessingError> {
        match stage {
            Stage::Fetch => info!(stage = %stage, url = payload.url(), attempt, "fetching podcast"),
            Stage::Transform => {
                info!(stage = %stage, title = payload.title(), attempt, "processing audio")
            }
            Stage::PersistMetadata => info!(
                stage = %stage,
                title = payload.title(),
                url = payload.url(),
                attempt,
                "saving metadata"
            ),
        }

        let started = Instant::now();
        tokio::time::sleep(self.durations.for_stage(stage)).await;

        if self.faults.should_fail(stage, attempt) {
            return Err(ProcessingError::transient(
                stage.as_str(),
                "simulated processing failure",
            ));
        }

        Ok(StageOutcome {
            stage,
            elapsed: started.elapsed(),
        })
    }
}

impl Default for SimulatedPipeline {
    fn default() -> Self {
        Self::new(StageDurations::default(), Arc::new(RandomFaults::default()))
    }
}

impl fmt::Debug for SimulatedPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedPipeline")
            .field("durations", &self.durations)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Pipeline for SimulatedPipeline {
    async fn run(
        &self,
        payload: &TaskPayload,
        attempt: u32,
    ) -> Result<Vec<StageOutcome>, ProcessingError> {
        let mut outcomes = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            outcomes.push(self.run_stage(stage, payload, attempt).await?);
        }
        Ok(outcomes)
    }
}
