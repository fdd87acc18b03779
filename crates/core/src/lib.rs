//! `podqueue-core` — the podcast submission record and its validation rules.
//!
//! This crate contains **pure domain** primitives (no broker or HTTP concerns).

pub mod error;
pub mod id;
pub mod payload;

pub use error::{DomainError, ValidationErrors};
pub use id::TaskId;
pub use payload::{MAX_TITLE_LEN, TaskPayload, check_title, check_url};
