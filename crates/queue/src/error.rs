//! Broker error types.

/// Publishing a task failed. Surfaced synchronously to whoever submitted it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// The broker could not be reached.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The broker was reached but refused the message.
    #[error("broker rejected publish: {0}")]
    Rejected(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Consume-side failures (receive/ack). Workers log these and keep polling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("broker command error: {0}")]
    Command(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Ack for a delivery the broker does not know about (already acked, or foreign).
    #[error("unknown delivery: {0}")]
    UnknownDelivery(String),
}
