//! Core scheduling primitives: job model, resource ledger, circuit breaker,
//! and the scheduler itself.

pub mod audit;
pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod job;
pub mod queue;
pub mod registry;
pub mod resource_pool;
pub mod scheduler;

pub use audit::{build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink};
pub use circuit_breaker::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use error::{AppResult, SchedulerError};
pub use executor::{JobExecutor, JobPayload, Spawn};
pub use job::{
    Job, JobId, JobMetadata, JobRecord, JobStatus, Priority, ResourceKind, ResourceRequirements,
};
pub use queue::PendingQueue;
pub use registry::CircuitBreakerRegistry;
pub use resource_pool::{DimensionStatus, ResourcePool, ResourceStatus};
pub use scheduler::{Scheduler, SchedulerLimits, SchedulerStats};
