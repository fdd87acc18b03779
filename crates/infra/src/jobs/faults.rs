//! Pluggable fault injection for the simulated pipeline.

use rand::Rng;

use super::pipeline::Stage;

/// Default probability of a simulated failure in the persist stage.
pub const DEFAULT_FAILURE_RATE: f64 = 0.05;

/// Decides whether a stage should fail for a given attempt (1-indexed).
pub trait FaultInjector: Send + Sync {
    fn should_fail(&self, stage: Stage, attempt: u32) -> bool;
}

/// Fail the persist stage with a fixed probability, independent of the attempt.
#[derive(Debug, Clone, Copy)]
pub struct RandomFaults {
    probability: f64,
}

impl RandomFaults {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl Default for RandomFaults {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_RATE)
    }
}

impl FaultInjector for RandomFaults {
    fn should_fail(&self, stage: Stage, _attempt: u32) -> bool {
        stage == Stage::PersistMetadata && rand::thread_rng().gen_bool(self.probability)
    }
}

/// Never fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn should_fail(&self, _stage: Stage, _attempt: u32) -> bool {
        false
    }
}

/// Fail the persist stage on every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysFail;

impl FaultInjector for AlwaysFail {
    fn should_fail(&self, stage: Stage, _attempt: u32) -> bool {
        stage == Stage::PersistMetadata
    }
}

/// Fail the persist stage for the first `n` attempts, then succeed.
#[derive(Debug, Clone, Copy)]
pub struct FailFirst(pub u32);

impl FaultInjector for FailFirst {
    fn should_fail(&self, stage: Stage, attempt: u32) -> bool {
        stage == Stage::PersistMetadata && attempt <= self.0
    }
}
