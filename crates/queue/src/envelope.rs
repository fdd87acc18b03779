use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use podqueue_core::{TaskId, TaskPayload};

/// Envelope for a task, containing routing metadata.
///
/// This is the unit published to the broker.
///
/// Notes:
/// - `destination` is the logical queue name (e.g. `"podcasts"`).
/// - `consumer_group` tags the message for the worker pool that should consume it.
/// - No attempt counter travels with the envelope: retries are counted by the
///   worker that runs the task, not by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    task_id: TaskId,
    destination: String,
    consumer_group: String,
    enqueued_at: DateTime<Utc>,
    payload: TaskPayload,
}

impl TaskEnvelope {
    pub fn new(
        task_id: TaskId,
        destination: impl Into<String>,
        consumer_group: impl Into<String>,
        enqueued_at: DateTime<Utc>,
        payload: TaskPayload,
    ) -> Self {
        Self {
            task_id,
            destination: destination.into(),
            consumer_group: consumer_group.into(),
            enqueued_at,
            payload,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn payload(&self) -> &TaskPayload {
        &self.payload
    }
}

/// One delivery of an envelope to one consumer.
///
/// `delivery_tag` identifies this delivery for acknowledgement. A broker
/// redelivery of the same task produces a new `Delivery` with the same
/// `task_id` and `redelivered == true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: String,
    pub envelope: TaskEnvelope,
    pub redelivered: bool,
}

impl Delivery {
    pub fn task_id(&self) -> TaskId {
        self.envelope.task_id()
    }
}
