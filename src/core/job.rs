//! Job data model: metadata, lifecycle status, priorities, and resource
//! requirements.
//!
//! A [`Job`] pairs immutable scheduling metadata with an opaque payload. The
//! scheduler tracks each job through a [`JobRecord`], which owns the mutable
//! lifecycle fields (status, timestamps, result, error) and is the unit that
//! retires into the bounded completed/failed histories.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Unique job identifier.
pub type JobId = uuid::Uuid;

/// Ordered priority tiers. `Critical` is the most urgent; derived ordering
/// follows declaration order, so `Critical < Background` when sorting the
/// pending queue ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Real-time work that preempts everything else in the queue.
    Critical,
    /// Latency-sensitive work.
    High,
    /// Default tier.
    Normal,
    /// Deferrable work.
    Low,
    /// Batch/backfill work that only runs when nothing else is waiting.
    Background,
}

impl Priority {
    /// The next more-urgent tier, saturating at `Critical`.
    #[must_use]
    pub const fn boosted(self) -> Self {
        match self {
            Self::Critical | Self::High => Self::Critical,
            Self::Normal => Self::High,
            Self::Low => Self::Normal,
            Self::Background => Self::Low,
        }
    }
}

/// Named capacity dimensions tracked by the resource ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Accelerator count.
    Gpu,
    /// Accelerator memory in megabytes.
    GpuMemoryMb,
    /// CPU cores.
    CpuCores,
    /// System memory in megabytes.
    MemoryMb,
}

/// Per-dimension resource amounts a job needs for its whole run, plus an
/// optional duration hint for capacity planning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    /// Non-negative amount required per dimension. Absent dimensions need 0.
    pub amounts: HashMap<ResourceKind, u64>,
    /// Estimated runtime in milliseconds. Advisory only.
    pub estimated_duration_ms: Option<u64>,
}

impl ResourceRequirements {
    /// Empty requirements (admissible against any pool).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the amount for one dimension.
    #[must_use]
    pub fn with(mut self, kind: ResourceKind, amount: u64) -> Self {
        self.amounts.insert(kind, amount);
        self
    }

    /// Attach an estimated-duration hint.
    #[must_use]
    pub const fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration_ms = Some(duration.as_millis() as u64);
        self
    }
}

/// Lifecycle status. Advances strictly
/// `Pending → Queued → Scheduled → Running → {Completed | Failed | Cancelled}`;
/// it never regresses and never skips `Scheduled` before `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet accepted by the scheduler.
    Pending,
    /// Accepted into the pending queue.
    Queued,
    /// Admitted: resources reserved, execution unit about to start.
    Scheduled,
    /// Execution unit is running the payload.
    Running,
    /// Terminal: payload returned a result.
    Completed,
    /// Terminal: payload errored, was rejected by the breaker, or timed out.
    Failed,
    /// Terminal: cancelled before or during execution.
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the lifecycle lattice permits advancing to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Queued)
                | (Self::Queued, Self::Scheduled | Self::Cancelled)
                | (Self::Scheduled, Self::Running | Self::Cancelled)
                | (
                    Self::Running,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
        )
    }
}

/// Immutable scheduling metadata for one unit of work.
///
/// Priority and requirements do not change after submission, except through
/// the scheduler's explicit priority-boost coordination call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Unique job identifier.
    pub id: JobId,
    /// Caller-defined type tag (e.g. `"inference"`, `"embedding"`).
    pub job_type: String,
    /// Queue-ordering tier.
    pub priority: Priority,
    /// Resources reserved at admission and released at completion.
    pub requirements: ResourceRequirements,
    /// Jobs that must be `Completed` before this one is admissible.
    pub depends_on: Vec<JobId>,
    /// Maximum manual retries. The admission loop never auto-retries.
    pub max_retries: u32,
    /// How many times this job has been resubmitted after failure.
    pub retry_count: u32,
    /// Job-level timeout in milliseconds. Guards the job's SLA independently
    /// of the breaker's call timeout.
    pub timeout_ms: u64,
    /// Opaque caller metadata. The `related_to` key tags jobs for the
    /// priority-boost coordination surface.
    pub metadata: HashMap<String, String>,
    /// Creation timestamp, milliseconds since epoch. Tie-breaker for
    /// FIFO ordering within a priority tier.
    pub created_at_ms: u128,
}

/// A schedulable job: metadata plus an opaque payload the scheduler hands to
/// the executor without interpreting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "P: serde::Serialize"))]
#[serde(bound(deserialize = "P: serde::de::DeserializeOwned"))]
pub struct Job<P> {
    /// Metadata driving scheduling decisions.
    pub meta: JobMetadata,
    /// Payload supplied by the caller.
    pub payload: P,
}

impl<P> Job<P> {
    /// Create a job with defaults: `Normal` priority, no requirements, no
    /// dependencies, no retries, 60s timeout.
    pub fn new(job_type: impl Into<String>, payload: P) -> Self {
        Self {
            meta: JobMetadata {
                id: uuid::Uuid::new_v4(),
                job_type: job_type.into(),
                priority: Priority::Normal,
                requirements: ResourceRequirements::new(),
                depends_on: Vec::new(),
                max_retries: 0,
                retry_count: 0,
                timeout_ms: 60_000,
                metadata: HashMap::new(),
                created_at_ms: now_ms(),
            },
            payload,
        }
    }

    /// Set the priority tier.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.meta.priority = priority;
        self
    }

    /// Set the resource requirements.
    #[must_use]
    pub fn with_requirements(mut self, requirements: ResourceRequirements) -> Self {
        self.meta.requirements = requirements;
        self
    }

    /// Declare dependencies that must complete first.
    #[must_use]
    pub fn with_dependencies(mut self, depends_on: Vec<JobId>) -> Self {
        self.meta.depends_on = depends_on;
        self
    }

    /// Set the job-level timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.meta.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the manual-retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.meta.max_retries = max_retries;
        self
    }

    /// Attach a metadata key/value pair.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.metadata.insert(key.into(), value.into());
        self
    }

    /// Clone this job for a manual retry, or `None` once the retry budget is
    /// exhausted. The clone gets a fresh id and creation time and
    /// `retry_count + 1`; callers should honor the scheduler's configured
    /// retry delay before resubmitting.
    #[must_use]
    pub fn next_attempt(&self) -> Option<Self>
    where
        P: Clone,
    {
        if self.meta.retry_count >= self.meta.max_retries {
            return None;
        }
        let mut meta = self.meta.clone();
        meta.id = uuid::Uuid::new_v4();
        meta.retry_count += 1;
        meta.created_at_ms = now_ms();
        Some(Self {
            meta,
            payload: self.payload.clone(),
        })
    }
}

/// Mutable lifecycle record the scheduler keeps per job. Retired into a
/// bounded FIFO history once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Scheduling metadata snapshot.
    pub meta: JobMetadata,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// When the job entered the pending queue.
    pub queued_at_ms: Option<u128>,
    /// When resources were reserved.
    pub scheduled_at_ms: Option<u128>,
    /// When the execution unit started the payload.
    pub started_at_ms: Option<u128>,
    /// When the job reached a terminal status.
    pub completed_at_ms: Option<u128>,
    /// Failure detail for `Failed` (and cancellation reason, if any).
    pub error: Option<String>,
    /// Opaque payload result for `Completed`.
    pub result: Option<serde_json::Value>,
}

impl JobRecord {
    /// Create a fresh record in `Pending`.
    #[must_use]
    pub const fn new(meta: JobMetadata) -> Self {
        Self {
            meta,
            status: JobStatus::Pending,
            queued_at_ms: None,
            scheduled_at_ms: None,
            started_at_ms: None,
            completed_at_ms: None,
            error: None,
            result: None,
        }
    }

    /// Advance the status, stamping the matching timestamp. Illegal
    /// transitions are refused with a warning rather than corrupting the
    /// record; returns whether the transition was applied.
    pub fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_advance_to(next) {
            tracing::warn!(
                job_id = %self.meta.id,
                from = ?self.status,
                to = ?next,
                "refusing illegal status transition"
            );
            return false;
        }
        let now = now_ms();
        match next {
            JobStatus::Queued => self.queued_at_ms = Some(now),
            JobStatus::Scheduled => self.scheduled_at_ms = Some(now),
            JobStatus::Running => self.started_at_ms = Some(now),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at_ms = Some(now);
            }
            JobStatus::Pending => {}
        }
        self.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lattice() {
        use JobStatus::*;
        assert!(Pending.can_advance_to(Queued));
        assert!(Queued.can_advance_to(Scheduled));
        assert!(Scheduled.can_advance_to(Running));
        assert!(Running.can_advance_to(Completed));
        assert!(Running.can_advance_to(Failed));
        assert!(Running.can_advance_to(Cancelled));
        assert!(Queued.can_advance_to(Cancelled));

        // Never regresses, never skips Scheduled.
        assert!(!Queued.can_advance_to(Running));
        assert!(!Running.can_advance_to(Queued));
        assert!(!Completed.can_advance_to(Running));
        assert!(!Pending.can_advance_to(Scheduled));
    }

    #[test]
    fn test_record_refuses_illegal_transition() {
        let job = Job::new("test", ());
        let mut record = JobRecord::new(job.meta);
        assert!(record.advance(JobStatus::Queued));
        assert!(!record.advance(JobStatus::Running)); // must pass Scheduled
        assert_eq!(record.status, JobStatus::Queued);
        assert!(record.advance(JobStatus::Scheduled));
        assert!(record.advance(JobStatus::Running));
        assert!(record.advance(JobStatus::Completed));
        assert!(record.completed_at_ms.is_some());
        assert!(!record.advance(JobStatus::Failed)); // terminal is final
    }

    #[test]
    fn test_priority_boost_saturates() {
        assert_eq!(Priority::Background.boosted(), Priority::Low);
        assert_eq!(Priority::Normal.boosted(), Priority::High);
        assert_eq!(Priority::Critical.boosted(), Priority::Critical);
    }

    #[test]
    fn test_next_attempt_respects_budget() {
        let job = Job::new("retryable", 7u32).with_max_retries(1);
        let retry = job.next_attempt().expect("one retry allowed");
        assert_eq!(retry.meta.retry_count, 1);
        assert_ne!(retry.meta.id, job.meta.id);
        assert!(retry.next_attempt().is_none());
    }

    #[test]
    fn test_priority_ordering_for_queue_sort() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Low < Priority::Background);
    }
}
