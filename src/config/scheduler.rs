//! Scheduler and breaker configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::circuit_breaker::CircuitBreakerConfig;
use crate::core::job::ResourceKind;
use crate::core::scheduler::SchedulerLimits;

/// Environment variable consulted by [`SchedulerConfig::load_from_env`].
pub const CONFIG_ENV_VAR: &str = "ATLAS_SCHEDULER_CONFIG";

/// Circuit breaker configuration (serialized form).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
    /// Milliseconds to stay open before probing recovery.
    pub recovery_timeout_ms: u64,
    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: u64,
    /// Maximum in-flight calls.
    pub max_concurrent: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        let core = CircuitBreakerConfig::default();
        Self {
            failure_threshold: core.failure_threshold,
            success_threshold: core.success_threshold,
            recovery_timeout_ms: core.recovery_timeout.as_millis() as u64,
            call_timeout_ms: core.call_timeout.as_millis() as u64,
            max_concurrent: core.max_concurrent,
        }
    }
}

impl BreakerConfig {
    /// Convert into the core breaker configuration.
    #[must_use]
    pub const fn to_core(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            recovery_timeout: Duration::from_millis(self.recovery_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            max_concurrent: self.max_concurrent,
        }
    }

    /// Validate breaker configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".into());
        }
        if self.success_threshold == 0 {
            return Err("success_threshold must be greater than 0".into());
        }
        if self.call_timeout_ms == 0 {
            return Err("call_timeout_ms must be greater than 0".into());
        }
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum concurrently running jobs.
    pub max_concurrent_jobs: usize,
    /// Pending-queue capacity before submissions are rejected.
    pub max_queue_size: usize,
    /// Admission-tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Capacity of each bounded terminal history.
    pub history_limit: usize,
    /// Not-before delay for manual retries, in milliseconds.
    pub retry_delay_ms: u64,
    /// Resource capacity per dimension.
    pub capacity: HashMap<ResourceKind, u64>,
    /// Shared breaker settings.
    pub breaker: BreakerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_queue_size: 100,
            tick_interval_ms: 100,
            history_limit: 256,
            retry_delay_ms: 1_000,
            capacity: HashMap::from([
                (ResourceKind::Gpu, 1),
                (ResourceKind::GpuMemoryMb, 16_000),
                (ResourceKind::CpuCores, num_cpus::get() as u64),
                (ResourceKind::MemoryMb, 32_000),
            ]),
            breaker: BreakerConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_jobs == 0 {
            return Err("max_concurrent_jobs must be greater than 0".into());
        }
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than 0".into());
        }
        if self.tick_interval_ms == 0 {
            return Err("tick_interval_ms must be greater than 0".into());
        }
        if self.history_limit == 0 {
            return Err("history_limit must be greater than 0".into());
        }
        if self.capacity.is_empty() {
            return Err("at least one capacity dimension must be defined".into());
        }
        self.breaker
            .validate()
            .map_err(|e| format!("breaker invalid: {e}"))?;
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from the `ATLAS_SCHEDULER_CONFIG` environment
    /// variable (JSON), reading a `.env` file first if present. Returns
    /// `None` when the variable is unset.
    pub fn load_from_env() -> Option<Result<Self, String>> {
        dotenvy::dotenv().ok();
        std::env::var(CONFIG_ENV_VAR)
            .ok()
            .map(|raw| Self::from_json_str(&raw))
    }

    /// Convert into core scheduler limits.
    #[must_use]
    pub const fn to_limits(&self) -> SchedulerLimits {
        SchedulerLimits {
            max_concurrent_jobs: self.max_concurrent_jobs,
            max_queue_size: self.max_queue_size,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            history_limit: self.history_limit,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut cfg = SchedulerConfig::default();
        cfg.max_concurrent_jobs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = SchedulerConfig::default();
        cfg.breaker.failure_threshold = 0;
        assert!(cfg.validate().unwrap_err().contains("breaker"));
    }

    #[test]
    fn test_from_json_str() {
        let raw = r#"{
            "max_concurrent_jobs": 2,
            "max_queue_size": 10,
            "tick_interval_ms": 50,
            "history_limit": 16,
            "retry_delay_ms": 500,
            "capacity": { "gpu": 1, "gpu_memory_mb": 8000 },
            "breaker": {
                "failure_threshold": 3,
                "success_threshold": 2,
                "recovery_timeout_ms": 1000,
                "call_timeout_ms": 2000,
                "max_concurrent": 8
            }
        }"#;
        let cfg = SchedulerConfig::from_json_str(raw).unwrap();
        assert_eq!(cfg.max_concurrent_jobs, 2);
        assert_eq!(cfg.capacity[&ResourceKind::Gpu], 1);
        assert_eq!(cfg.breaker.to_core().call_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(SchedulerConfig::from_json_str("{}").is_err());
        let mut cfg = SchedulerConfig::default();
        cfg.capacity.clear();
        let raw = serde_json::to_string(&cfg).unwrap();
        assert!(SchedulerConfig::from_json_str(&raw).is_err());
    }
}
