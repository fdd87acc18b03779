//! Infrastructure layer: queue client, task executor, worker pool, broker adapters, config.

pub mod broker;
pub mod config;
pub mod jobs;
pub mod queue_client;
pub mod workers;

pub use config::{AppConfig, BrokerConfig, BrokerKind, ConfigError, WorkerConfig};
pub use queue_client::{Ack, QueueClient, QueueConfig};
