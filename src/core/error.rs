//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::job::{JobId, ResourceKind};

/// Errors produced by scheduler components.
///
/// Backpressure rejections (full queue, breaker open, concurrency limit) are
/// signaled immediately to the caller and never retried by the core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Pending queue is at capacity; the submission was rejected.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Allocation would drive a ledger dimension negative.
    #[error("insufficient {kind:?}: requested {requested}, available {available}")]
    InsufficientCapacity {
        /// Dimension that could not be satisfied.
        kind: ResourceKind,
        /// Amount requested.
        requested: u64,
        /// Amount currently available.
        available: u64,
    },
    /// The referenced job is not known to the scheduler.
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
