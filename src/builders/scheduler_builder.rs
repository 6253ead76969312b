//! Assemble a scheduler and its shared breaker from validated configuration.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::circuit_breaker::CircuitBreaker;
use crate::core::error::SchedulerError;
use crate::core::executor::{JobExecutor, JobPayload, Spawn};
use crate::core::registry::CircuitBreakerRegistry;
use crate::core::scheduler::Scheduler;

/// Build a scheduler from configuration, registering (or reusing) the shared
/// breaker under `breaker_name` so other call sites to the same downstream
/// resource share its learned fault history.
pub fn build_scheduler<P, E, S>(
    cfg: &SchedulerConfig,
    registry: &CircuitBreakerRegistry,
    breaker_name: &str,
    executor: E,
    spawner: S,
) -> Result<Arc<Scheduler<P, E, S>>, SchedulerError>
where
    P: JobPayload,
    E: JobExecutor<P>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;

    let breaker: Arc<CircuitBreaker> = registry.get_or_create(breaker_name, cfg.breaker.to_core());
    Ok(Arc::new(Scheduler::new(
        cfg.to_limits(),
        cfg.capacity.clone(),
        breaker,
        executor,
        spawner,
    )))
}
