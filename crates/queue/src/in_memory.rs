//! In-memory broker for tests/dev.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::broker::QueueBroker;
use crate::envelope::{Delivery, TaskEnvelope};
use crate::error::{BrokerError, PublishError};

type QueueKey = (String, String);

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<(TaskEnvelope, bool)>,
    unacked: HashMap<String, TaskEnvelope>,
}

/// In-memory competing-consumers broker.
///
/// - One FIFO per `(destination, consumer_group)`
/// - Each envelope goes to exactly one `receive` call
/// - Unacked deliveries stay parked until [`InMemoryBroker::requeue_unacked`]
///   simulates the broker noticing a dead consumer
/// - Acked envelopes are dropped; only [`InMemoryBroker::with_publish_log`]
///   keeps a copy of everything published
#[derive(Debug)]
pub struct InMemoryBroker {
    queues: Mutex<HashMap<QueueKey, QueueState>>,
    publish_log: Option<Mutex<Vec<TaskEnvelope>>>,
    notify: Notify,
    next_tag: AtomicU64,
    available: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker that also records every published envelope, for assertions in tests.
    pub fn with_publish_log() -> Self {
        Self {
            publish_log: Some(Mutex::new(Vec::new())),
            ..Self::default()
        }
    }

    /// Toggle broker reachability; while unavailable every publish fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Every envelope successfully published, in publish order.
    ///
    /// Always empty unless the broker was built with [`InMemoryBroker::with_publish_log`].
    pub fn published(&self) -> Vec<TaskEnvelope> {
        self.publish_log
            .as_ref()
            .and_then(|log| log.lock().ok().map(|p| p.clone()))
            .unwrap_or_default()
    }

    /// Envelopes waiting to be delivered.
    pub fn ready_len(&self, destination: &str, consumer_group: &str) -> usize {
        self.with_queue(destination, consumer_group, |q| q.ready.len())
    }

    /// Deliveries handed out but not yet acknowledged.
    pub fn unacked_len(&self, destination: &str, consumer_group: &str) -> usize {
        self.with_queue(destination, consumer_group, |q| q.unacked.len())
    }

    /// Move every unacked delivery back to the front of its queue, flagged as redelivered.
    ///
    /// Returns how many deliveries were requeued.
    pub fn requeue_unacked(&self) -> usize {
        let mut count = 0;
        if let Ok(mut queues) = self.queues.lock() {
            for state in queues.values_mut() {
                for (_, envelope) in state.unacked.drain() {
                    state.ready.push_front((envelope, true));
                    count += 1;
                }
            }
        }
        if count > 0 {
            debug!(count, "requeued unacked deliveries");
            self.notify.notify_waiters();
        }
        count
    }

    fn with_queue<T: Default>(
        &self,
        destination: &str,
        consumer_group: &str,
        f: impl FnOnce(&QueueState) -> T,
    ) -> T {
        let Ok(queues) = self.queues.lock() else {
            return T::default();
        };
        queues
            .get(&(destination.to_string(), consumer_group.to_string()))
            .map(f)
            .unwrap_or_default()
    }

    fn try_take(
        &self,
        destination: &str,
        consumer_group: &str,
    ) -> Result<Option<Delivery>, BrokerError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| BrokerError::Connection("broker state poisoned".to_string()))?;

        let Some(state) = queues.get_mut(&(destination.to_string(), consumer_group.to_string()))
        else {
            return Ok(None);
        };

        let Some((envelope, redelivered)) = state.ready.pop_front() else {
            return Ok(None);
        };

        let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst).to_string();
        state.unacked.insert(delivery_tag.clone(), envelope.clone());

        Ok(Some(Delivery {
            delivery_tag,
            envelope,
            redelivered,
        }))
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            publish_log: None,
            notify: Notify::new(),
            next_tag: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl QueueBroker for InMemoryBroker {
    async fn publish(&self, envelope: TaskEnvelope) -> Result<String, PublishError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PublishError::Unavailable(
                "in-memory broker marked unavailable".to_string(),
            ));
        }

        let key = (
            envelope.destination().to_string(),
            envelope.consumer_group().to_string(),
        );
        let message_id = envelope.task_id().to_string();

        {
            let mut queues = self
                .queues
                .lock()
                .map_err(|_| PublishError::Unavailable("broker state poisoned".to_string()))?;
            if let Some(Ok(mut log)) = self.publish_log.as_ref().map(Mutex::lock) {
                log.push(envelope.clone());
            }
            queues.entry(key).or_default().ready.push_back((envelope, false));
        }

        debug!(message_id = %message_id, "envelope published");
        self.notify.notify_waiters();
        Ok(message_id)
    }

    async fn receive(
        &self,
        destination: &str,
        consumer_group: &str,
        _consumer: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Register interest before checking so a publish in between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take(destination, consumer_group)? {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut queues = self
            .queues
            .lock()
            .map_err(|_| BrokerError::Connection("broker state poisoned".to_string()))?;

        let key = (
            delivery.envelope.destination().to_string(),
            delivery.envelope.consumer_group().to_string(),
        );

        queues
            .get_mut(&key)
            .and_then(|state| state.unacked.remove(&delivery.delivery_tag))
            .map(|_| ())
            .ok_or_else(|| BrokerError::UnknownDelivery(delivery.delivery_tag.clone()))
    }
}
