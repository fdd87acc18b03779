//! Thin publisher that hands validated payloads to the broker.

use chrono::Utc;
use tracing::{info, instrument, warn};

use podqueue_core::{TaskId, TaskPayload};
use podqueue_queue::{PublishError, QueueBroker, TaskEnvelope};

/// Default destination for podcast tasks.
pub const DEFAULT_DESTINATION: &str = "podcasts";

/// Default consumer group bound to the worker pool.
pub const DEFAULT_CONSUMER_GROUP: &str = "podcasts.workers";

/// Where published tasks go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub destination: String,
    pub consumer_group: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            destination: DEFAULT_DESTINATION.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
        }
    }
}

/// Broker acknowledgement of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub task_id: TaskId,
    pub message_id: String,
    pub destination: String,
}

/// Publishes task payloads to the configured destination.
///
/// Payloads are trusted (validated at the boundary) and publishing is
/// attempted exactly once: broker failures are returned to the caller.
#[derive(Debug, Clone)]
pub struct QueueClient<B> {
    broker: B,
    config: QueueConfig,
}

impl<B: QueueBroker> QueueClient<B> {
    pub fn new(broker: B, config: QueueConfig) -> Self {
        Self { broker, config }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    #[instrument(
        skip(self, payload),
        fields(destination = %self.config.destination, title = payload.title()),
        err
    )]
    pub async fn submit(&self, payload: TaskPayload) -> Result<Ack, PublishError> {
        let task_id = TaskId::new();
        let envelope = TaskEnvelope::new(
            task_id,
            &self.config.destination,
            &self.config.consumer_group,
            Utc::now(),
            payload,
        );

        match self.broker.publish(envelope).await {
            Ok(message_id) => {
                info!(task_id = %task_id, message_id = %message_id, "podcast task queued");
                Ok(Ack {
                    task_id,
                    message_id,
                    destination: self.config.destination.clone(),
                })
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "failed to queue podcast task");
                Err(e)
            }
        }
    }
}
