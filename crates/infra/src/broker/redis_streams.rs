//! Redis Streams-backed broker (durable, at-least-once delivery).
//!
//! This implementation uses Redis Streams (XADD/XREADGROUP) to provide:
//! - **Durable delivery**: entries persist until acknowledged
//! - **At-least-once**: entries left pending by a dead consumer are reclaimed
//! - **Consumer groups**: each worker pool reads through its own group
//! - **Poison handling**: entries that cannot be decoded go to a dead-letter stream
//!
//! ## Layout
//!
//! - **Stream Key**: `{namespace}:{destination}` (e.g. `podqueue:podcasts`)
//! - **Consumer Groups**: one per worker pool (e.g. `podcasts.workers`)
//! - **Consumers**: named consumers within groups (e.g. `podcast-worker-1`)
//! - **Dead-Letter Stream**: `{stream}:dlq`

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use tracing::{instrument, warn};

use podqueue_queue::{BrokerError, Delivery, PublishError, QueueBroker, TaskEnvelope};

use crate::config::BrokerConfig;

/// Default idle time before another consumer may reclaim a pending entry.
const DEFAULT_PENDING_TIMEOUT_MS: u64 = 300_000;

/// How many pending entries to inspect per receive.
const PENDING_SCAN_COUNT: usize = 10;

#[derive(Debug)]
pub struct RedisStreamsBroker {
    client: redis::Client,
    namespace: String,
    pending_timeout_ms: u64,
    known_groups: Mutex<HashSet<(String, String)>>,
}

impl RedisStreamsBroker {
    /// Create a new Redis Streams broker.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `namespace` - prefix for every stream key (e.g., "podqueue")
    pub fn new(
        redis_url: impl AsRef<str>,
        namespace: impl Into<String>,
    ) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            namespace: namespace.into(),
            pending_timeout_ms: DEFAULT_PENDING_TIMEOUT_MS,
            known_groups: Mutex::new(HashSet::new()),
        })
    }

    pub fn from_config(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let url = config
            .redis_url()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        Self::new(url, config.namespace())
    }

    /// Entries idle longer than this are reclaimed from their consumer.
    ///
    /// Keep it above the longest possible task run (all attempts plus backoff),
    /// or a slow task may be picked up a second time while still running.
    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn stream_key(&self, destination: &str) -> String {
        format!("{}:{}", self.namespace, destination)
    }

    fn dlq_key(&self, destination: &str) -> String {
        format!("{}:dlq", self.stream_key(destination))
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))
    }

    /// Ensure a consumer group exists (idempotent).
    pub async fn ensure_consumer_group(
        &self,
        conn: &mut MultiplexedConnection,
        destination: &str,
        group: &str,
    ) -> Result<(), BrokerError> {
        let cache_key = (destination.to_string(), group.to_string());
        if self
            .known_groups
            .lock()
            .map(|g| g.contains(&cache_key))
            .unwrap_or(false)
        {
            return Ok(());
        }

        // MKSTREAM creates the stream if needed; BUSYGROUP means it already exists.
        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(self.stream_key(destination), group, "0")
            .await;
        match created {
            Ok(()) => {}
            Err(e) if e.code() == Some("BUSYGROUP") => {}
            Err(e) => return Err(BrokerError::Command(format!("XGROUP CREATE failed: {e}"))),
        }

        if let Ok(mut groups) = self.known_groups.lock() {
            groups.insert(cache_key);
        }
        Ok(())
    }

    /// `XPENDING key group IDLE <ms> - + <count>`: only entries idle past the reclaim timeout.
    fn stale_pending_cmd(&self, destination: &str, group: &str) -> redis::Cmd {
        let mut cmd = redis::cmd("XPENDING");
        cmd.arg(self.stream_key(destination))
            .arg(group)
            .arg("IDLE")
            .arg(self.pending_timeout_ms)
            .arg("-")
            .arg("+")
            .arg(PENDING_SCAN_COUNT);
        cmd
    }

    /// Take over one entry another consumer left pending for too long.
    async fn claim_stale(
        &self,
        conn: &mut MultiplexedConnection,
        destination: &str,
        group: &str,
        consumer: &str,
    ) -> Result<Option<StreamId>, BrokerError> {
        let pending: StreamPendingCountReply = self
            .stale_pending_cmd(destination, group)
            .query_async(conn)
            .await
            .map_err(|e| BrokerError::Command(format!("XPENDING failed: {e}")))?;

        let Some(stale) = pending.ids.first() else {
            return Ok(None);
        };

        let claimed: StreamClaimReply = conn
            .xclaim(
                self.stream_key(destination),
                group,
                consumer,
                self.pending_timeout_ms,
                &[&stale.id],
            )
            .await
            .map_err(|e| BrokerError::Command(format!("XCLAIM failed: {e}")))?;

        Ok(claimed.ids.into_iter().next())
    }

    async fn read_new(
        &self,
        conn: &mut MultiplexedConnection,
        destination: &str,
        group: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<StreamId>, BrokerError> {
        let key = self.stream_key(destination);
        // BLOCK 0 would wait forever.
        let block_ms = (wait.as_millis() as usize).max(1);
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(1)
            .block(block_ms);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&key], &[">"], &opts)
            .await
            .map_err(|e| BrokerError::Command(format!("XREADGROUP failed: {e}")))?;

        Ok(reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|k| k.ids.into_iter().next()))
    }

    /// Decode an entry, dead-lettering it if it is unreadable.
    async fn into_delivery(
        &self,
        conn: &mut MultiplexedConnection,
        destination: &str,
        group: &str,
        entry: StreamId,
        redelivered: bool,
    ) -> Result<Option<Delivery>, BrokerError> {
        let decoded = entry
            .get::<String>("envelope")
            .ok_or_else(|| "missing envelope field".to_string())
            .and_then(|raw| {
                serde_json::from_str::<TaskEnvelope>(&raw).map_err(|e| e.to_string())
            });

        match decoded {
            Ok(envelope) => Ok(Some(Delivery {
                delivery_tag: entry.id,
                envelope,
                redelivered,
            })),
            Err(reason) => {
                self.dead_letter(conn, destination, group, &entry.id, &reason).await?;
                Ok(None)
            }
        }
    }

    async fn dead_letter(
        &self,
        conn: &mut MultiplexedConnection,
        destination: &str,
        group: &str,
        message_id: &str,
        reason: &str,
    ) -> Result<(), BrokerError> {
        let failed_at = chrono::Utc::now().to_rfc3339();
        let _: String = conn
            .xadd(
                self.dlq_key(destination),
                "*",
                &[
                    ("original_message_id", message_id),
                    ("reason", reason),
                    ("failed_at", failed_at.as_str()),
                ],
            )
            .await
            .map_err(|e| BrokerError::Command(format!("DLQ XADD failed: {e}")))?;

        let _: i64 = conn
            .xack(self.stream_key(destination), group, &[message_id])
            .await
            .map_err(|e| BrokerError::Command(format!("XACK failed: {e}")))?;

        warn!(
            message_id = %message_id,
            reason = %reason,
            "undecodable entry sent to dead-letter stream"
        );
        Ok(())
    }
}

#[async_trait]
impl QueueBroker for RedisStreamsBroker {
    #[instrument(
        skip(self, envelope),
        fields(
            stream_key = %self.stream_key(envelope.destination()),
            task_id = %envelope.task_id()
        ),
        err
    )]
    async fn publish(&self, envelope: TaskEnvelope) -> Result<String, PublishError> {
        let body = serde_json::to_string(&envelope)
            .map_err(|e| PublishError::Serialization(e.to_string()))?;

        let mut conn = self
            .connection()
            .await
            .map_err(|e| PublishError::Unavailable(e.to_string()))?;

        let task_id = envelope.task_id().to_string();
        let message_id: String = conn
            .xadd(
                self.stream_key(envelope.destination()),
                "*",
                &[
                    ("task_id", task_id.as_str()),
                    ("consumer_group", envelope.consumer_group()),
                    ("envelope", body.as_str()),
                ],
            )
            .await
            .map_err(|e| PublishError::Rejected(format!("XADD failed: {e}")))?;

        Ok(message_id)
    }

    async fn receive(
        &self,
        destination: &str,
        consumer_group: &str,
        consumer: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BrokerError> {
        let mut conn = self.connection().await?;
        self.ensure_consumer_group(&mut conn, destination, consumer_group)
            .await?;

        if let Some(entry) = self
            .claim_stale(&mut conn, destination, consumer_group, consumer)
            .await?
        {
            return self
                .into_delivery(&mut conn, destination, consumer_group, entry, true)
                .await;
        }

        match self
            .read_new(&mut conn, destination, consumer_group, consumer, wait)
            .await?
        {
            Some(entry) => {
                self.into_delivery(&mut conn, destination, consumer_group, entry, false)
                    .await
            }
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut conn = self.connection().await?;
        let acked: i64 = conn
            .xack(
                self.stream_key(delivery.envelope.destination()),
                delivery.envelope.consumer_group(),
                &[&delivery.delivery_tag],
            )
            .await
            .map_err(|e| BrokerError::Command(format!("XACK failed: {e}")))?;

        if acked == 0 {
            return Err(BrokerError::UnknownDelivery(delivery.delivery_tag.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_destination() {
        let broker = RedisStreamsBroker::new("redis://127.0.0.1:6379", "podqueue").unwrap();
        assert_eq!(broker.stream_key("podcasts"), "podqueue:podcasts");
        assert_eq!(broker.dlq_key("podcasts"), "podqueue:podcasts:dlq");
    }

    #[test]
    fn builds_from_config() {
        let config = BrokerConfig {
            vhost: "/staging".to_string(),
            ..BrokerConfig::default()
        };
        let broker = RedisStreamsBroker::from_config(&config).unwrap();
        assert_eq!(broker.stream_key("podcasts"), "podqueue:staging:podcasts");
    }

    #[test]
    fn pending_scan_filters_by_idle_time() {
        let broker = RedisStreamsBroker::new("redis://127.0.0.1:6379", "podqueue")
            .unwrap()
            .with_pending_timeout(Duration::from_secs(90));

        let packed = broker
            .stale_pending_cmd("podcasts", "podcasts.workers")
            .get_packed_command();
        let packed = String::from_utf8_lossy(&packed);

        let idle_then_ms = "$4\r\nIDLE\r\n$5\r\n90000\r\n";
        assert!(packed.contains("podqueue:podcasts"));
        assert!(packed.contains(idle_then_ms), "unexpected command: {packed}");
    }

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            RedisStreamsBroker::new("not a url", "podqueue"),
            Err(BrokerError::Connection(_))
        ));
    }

    #[tokio::test]
    #[ignore = "requires a Redis server on 127.0.0.1:6379"]
    async fn publish_receive_ack_against_live_redis() {
        use chrono::Utc;
        use podqueue_core::{TaskId, TaskPayload};

        let namespace = format!("podqueue-test-{}", TaskId::new());
        let broker = RedisStreamsBroker::new("redis://127.0.0.1:6379", namespace).unwrap();
        let envelope = TaskEnvelope::new(
            TaskId::new(),
            "podcasts",
            "podcasts.workers",
            Utc::now(),
            TaskPayload::new("T", "https://example.com/a.mp3").unwrap(),
        );

        // Create the group first so the entry is visible to it.
        let mut conn = broker.connection().await.unwrap();
        broker
            .ensure_consumer_group(&mut conn, "podcasts", "podcasts.workers")
            .await
            .unwrap();

        broker.publish(envelope.clone()).await.unwrap();
        let delivery = broker
            .receive("podcasts", "podcasts.workers", "w1", Duration::from_millis(500))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(delivery.envelope, envelope);
        broker.ack(&delivery).await.unwrap();
        assert!(matches!(
            broker.ack(&delivery).await,
            Err(BrokerError::UnknownDelivery(_))
        ));
    }
}
