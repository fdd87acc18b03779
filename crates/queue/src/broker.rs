//! Queue broker abstraction (mechanics only).
//!
//! The broker is an external collaborator: it stores published envelopes and
//! hands each one to a single consumer of the matching consumer group
//! (competing consumers).
//!
//! ## Delivery guarantees
//!
//! - **At-least-once**: an envelope stays unacknowledged until the consumer
//!   calls [`QueueBroker::ack`]. If the consumer dies first, the broker may
//!   deliver it again.
//! - **No ordering guarantee** across tasks.
//! - **No exclusivity beyond one delivery**: two consumers never hold the same
//!   delivery, but a redelivery after a crash is a new delivery of the same task.
//!
//! Consumers must therefore tolerate running the same task twice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::{Delivery, TaskEnvelope};
use crate::error::{BrokerError, PublishError};

#[async_trait]
pub trait QueueBroker: Send + Sync + std::fmt::Debug {
    /// Publish an envelope to its destination. Returns the broker's message id.
    ///
    /// Implementations must not retry: a failure is reported to the caller as-is.
    async fn publish(&self, envelope: TaskEnvelope) -> Result<String, PublishError>;

    /// Wait up to `wait` for the next delivery on `destination` for `consumer_group`.
    ///
    /// `Ok(None)` means nothing arrived in time.
    async fn receive(
        &self,
        destination: &str,
        consumer_group: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BrokerError>;

    /// Acknowledge a delivery; the broker will not deliver it again.
    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;
}

#[async_trait]
impl<B> QueueBroker for Arc<B>
where
    B: QueueBroker + ?Sized,
{
    async fn publish(&self, envelope: TaskEnvelope) -> Result<String, PublishError> {
        (**self).publish(envelope).await
    }

    async fn receive(
        &self,
        destination: &str,
        consumer_group: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        (**self).receive(destination, consumer_group, consumer, wait).await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        (**self).ack(delivery).await
    }
}
