//! Infrastructure-backed broker implementations.
//!
//! The broker contract and the in-memory broker live in `podqueue-queue`.
//! This module provides the networked ones (e.g. Redis).

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsBroker;
