//! Broker-facing queue mechanics: envelopes, the broker contract, and an
//! in-memory broker for tests/dev.

pub mod broker;
pub mod envelope;
pub mod error;
pub mod in_memory;

pub use broker::QueueBroker;
pub use envelope::{Delivery, TaskEnvelope};
pub use error::{BrokerError, PublishError};
pub use in_memory::InMemoryBroker;
