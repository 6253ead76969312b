//! Execution seams: payload marker, executor trait, and runtime spawning.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::job::JobMetadata;

/// Marker trait for serializable job payloads.
///
/// Payloads must be `Send + Sync` for cross-task execution and
/// `Serialize + Deserialize` so jobs can be logged, persisted, or cloned for
/// manual retries.
pub trait JobPayload: Send + Sync + Serialize + for<'de> Deserialize<'de> + 'static {}

/// Blanket implementation: any type meeting the requirements is a payload.
impl<T> JobPayload for T where T: Send + Sync + Serialize + for<'de> Deserialize<'de> + 'static {}

/// Executes a job payload and produces an opaque result.
///
/// The scheduler invokes this through the shared circuit breaker and under
/// the job-level timeout; it never interprets payload semantics. Returning
/// `Err` marks the job `Failed` and counts toward the breaker's failure
/// streak.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use atlas_scheduler::core::{JobExecutor, JobMetadata};
///
/// #[derive(Clone)]
/// struct InferenceExecutor;
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct InferenceJob {
///     model: String,
///     prompt: String,
/// }
///
/// #[async_trait]
/// impl JobExecutor<InferenceJob> for InferenceExecutor {
///     async fn execute(
///         &self,
///         payload: InferenceJob,
///         _meta: JobMetadata,
///     ) -> anyhow::Result<serde_json::Value> {
///         Ok(serde_json::json!({ "model": payload.model, "text": "..." }))
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor<P>: Send + Sync + Clone + 'static
where
    P: JobPayload,
{
    /// Run the payload to completion, returning the job's opaque result.
    async fn execute(&self, payload: P, meta: JobMetadata) -> anyhow::Result<serde_json::Value>;
}

/// Abstraction for spawning execution units on a runtime.
pub trait Spawn {
    /// Spawn an async task.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
