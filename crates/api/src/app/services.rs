use std::sync::Arc;

use tracing::{info, warn};

use podqueue_infra::jobs::{
    RandomFaults, SimulatedPipeline, StageDurations, TaskExecutor, TracingObserver,
};
use podqueue_infra::{BrokerConfig, BrokerKind, QueueClient, QueueConfig, WorkerConfig};
use podqueue_queue::{BrokerError, InMemoryBroker, QueueBroker};

/// Shared broker handle used by both the HTTP side and the worker pool.
pub type SharedBroker = Arc<dyn QueueBroker>;

/// Services shared across request handlers.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub queue: QueueClient<SharedBroker>,
}

impl AppServices {
    pub fn new(broker: SharedBroker, config: QueueConfig) -> Self {
        Self {
            queue: QueueClient::new(broker, config),
        }
    }

    /// In-memory wiring that records every publish.
    #[cfg(test)]
    pub fn in_memory() -> (Self, Arc<InMemoryBroker>) {
        let broker = Arc::new(InMemoryBroker::with_publish_log());
        (Self::new(broker.clone(), QueueConfig::default()), broker)
    }
}

/// Pick the broker implementation from config.
///
/// Without the `redis` feature a Redis config falls back to the in-memory broker.
pub fn build_broker(config: &BrokerConfig) -> Result<SharedBroker, BrokerError> {
    match config.kind {
        BrokerKind::Memory => {
            info!("using in-memory broker");
            Ok(Arc::new(InMemoryBroker::new()))
        }
        BrokerKind::Redis => redis_broker(config),
    }
}

#[cfg(feature = "redis")]
fn redis_broker(config: &BrokerConfig) -> Result<SharedBroker, BrokerError> {
    let broker = podqueue_infra::broker::RedisStreamsBroker::from_config(config)?;
    info!(
        host = %config.host,
        port = config.port,
        namespace = %config.namespace(),
        "using redis streams broker"
    );
    Ok(Arc::new(broker))
}

#[cfg(not(feature = "redis"))]
fn redis_broker(_config: &BrokerConfig) -> Result<SharedBroker, BrokerError> {
    warn!("redis broker requested but the `redis` feature is disabled; using in-memory broker");
    Ok(Arc::new(InMemoryBroker::new()))
}

/// Executor running the simulated fetch/transform/persist pipeline.
pub fn build_executor(config: &WorkerConfig) -> TaskExecutor {
    let pipeline = SimulatedPipeline::new(
        StageDurations::default(),
        Arc::new(RandomFaults::new(config.failure_rate)),
    );
    TaskExecutor::new(
        Arc::new(pipeline),
        Arc::new(TracingObserver),
        config.executor_config(),
    )
}
