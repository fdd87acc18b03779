use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use podqueue_queue::QueueBroker;

use crate::jobs::{ExecutorStats, TaskExecutor};
use crate::queue_client::QueueConfig;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Name prefix for logging and consumer names
    pub name: String,
    pub queue: QueueConfig,
    /// Number of competing consumers
    pub workers: usize,
    /// How long one receive call waits before re-checking for shutdown
    pub receive_wait: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "podcast-worker".to_string(),
            queue: QueueConfig::default(),
            workers: 2,
            receive_wait: Duration::from_millis(500),
        }
    }
}

/// Handle to control and join a running pool.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    executor: Arc<TaskExecutor>,
}

impl WorkerPoolHandle {
    /// Stop taking new deliveries and wait for in-flight tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for join in self.joins {
            let _ = join.await;
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.executor.stats()
    }
}

/// Pool of competing consumers on one destination.
///
/// - Each worker takes one delivery, runs it to a terminal state, acks it
/// - Unacked deliveries (worker died mid-task) are the broker's to redeliver
/// - Shutdown only interrupts the wait for the next delivery, never a running task
#[derive(Debug)]
pub struct WorkerPool;

impl WorkerPool {
    pub fn spawn<B>(
        broker: B,
        executor: Arc<TaskExecutor>,
        config: WorkerPoolConfig,
    ) -> WorkerPoolHandle
    where
        B: QueueBroker + Clone + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..config.workers.max(1))
            .map(|i| {
                let consumer = format!("{}-{}", config.name, i + 1);
                tokio::spawn(worker_loop(
                    consumer,
                    broker.clone(),
                    executor.clone(),
                    config.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            joins,
            executor,
        }
    }
}

async fn worker_loop<B: QueueBroker>(
    consumer: String,
    broker: B,
    executor: Arc<TaskExecutor>,
    config: WorkerPoolConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let queue = &config.queue;
    info!(worker = %consumer, destination = %queue.destination, "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let next = broker.receive(
            &queue.destination,
            &queue.consumer_group,
            &consumer,
            config.receive_wait,
        );
        let received = tokio::select! {
            _ = shutdown_rx.changed() => break,
            r = next => r,
        };

        let delivery = match received {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(e) => {
                error!(worker = %consumer, error = %e, "failed to receive from broker");
                tokio::time::sleep(config.receive_wait).await;
                continue;
            }
        };

        let queued_ms = (Utc::now() - delivery.envelope.enqueued_at()).num_milliseconds();
        debug!(
            worker = %consumer,
            task_id = %delivery.task_id(),
            redelivered = delivery.redelivered,
            queued_ms,
            "received task"
        );

        let record = executor
            .execute(delivery.task_id(), delivery.envelope.payload().clone())
            .await;

        if let Err(e) = broker.ack(&delivery).await {
            warn!(
                worker = %consumer,
                task_id = %record.task_id(),
                status = ?record.status(),
                error = %e,
                "failed to ack delivery; broker may redeliver"
            );
        }
    }

    info!(worker = %consumer, "worker stopped");
}
