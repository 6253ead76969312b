//! Configuration models for the scheduler and breaker.

pub mod scheduler;

pub use scheduler::{BreakerConfig, SchedulerConfig, CONFIG_ENV_VAR};
