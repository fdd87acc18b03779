//! Long-running consumers that pull tasks off the broker.

pub mod pool;

pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolHandle};
