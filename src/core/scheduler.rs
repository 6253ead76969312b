//! Priority job scheduler: bounded submission, periodic admission against the
//! resource ledger, breaker-wrapped execution, and bounded outcome histories.
//!
//! One logical admission loop ticks at a fixed interval; up to
//! `max_concurrent_jobs` execution units run independently, each bounded by
//! the shared circuit breaker's call timeout and by its own job-level
//! timeout. The pending queue, the ledger, the record map, the running set,
//! and the histories all live behind a single mutex so the admissibility
//! check and the resource allocation are atomic together — two ticks can
//! never both pass `can_allocate` for the same scarce unit.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::audit::{build_audit_event, AuditSink};
use crate::core::circuit_breaker::{BreakerError, CircuitBreaker, CircuitState};
use crate::core::executor::{JobExecutor, JobPayload, Spawn};
use crate::core::job::{Job, JobId, JobRecord, JobStatus, ResourceKind, ResourceRequirements};
use crate::core::queue::PendingQueue;
use crate::core::resource_pool::{ResourcePool, ResourceStatus};

/// Scheduler capacity and pacing limits.
#[derive(Debug, Clone)]
pub struct SchedulerLimits {
    /// Maximum concurrently running execution units.
    pub max_concurrent_jobs: usize,
    /// Pending-queue depth beyond which submissions are rejected.
    pub max_queue_size: usize,
    /// Admission-tick interval.
    pub tick_interval: Duration,
    /// Capacity of each bounded terminal history (completed, failed).
    pub history_limit: usize,
    /// Not-before delay producers should honor between a failure and a
    /// manual resubmission.
    pub retry_delay: Duration,
}

impl Default for SchedulerLimits {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_queue_size: 100,
            tick_interval: Duration::from_millis(100),
            history_limit: 256,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Derived, read-only scheduler statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Jobs accepted by `submit`.
    pub submitted: u64,
    /// Jobs that reached `Completed`.
    pub completed: u64,
    /// Jobs that reached `Failed`.
    pub failed: u64,
    /// Jobs that reached `Cancelled`.
    pub cancelled: u64,
    /// Submissions rejected for a full queue.
    pub rejected: u64,
    /// Failures caused by a breaker-level or job-level timeout.
    pub timed_out: u64,
    /// Current pending-queue depth.
    pub queue_depth: usize,
    /// Configured pending-queue capacity.
    pub queue_capacity: usize,
    /// Currently running execution units.
    pub running: usize,
    /// Configured concurrency limit.
    pub max_concurrent_jobs: usize,
    /// Per-dimension ledger utilization (`1 - available/total`).
    pub utilization: HashMap<ResourceKind, f64>,
    /// Current state of the shared circuit breaker.
    pub breaker_state: CircuitState,
}

#[derive(Debug, Default)]
struct SchedulerCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
}

/// Bookkeeping for one running execution unit.
struct RunningJob {
    /// Cooperative cancellation signal; `None` once signaled.
    cancel: Option<oneshot::Sender<()>>,
    requirements: ResourceRequirements,
}

/// Terminal outcome of one execution unit.
enum Outcome {
    Completed(serde_json::Value),
    Failed { error: String, timed_out: bool },
    JobTimeout(Duration),
    Cancelled,
}

/// All shared mutable scheduler state, guarded by a single mutex.
struct SchedState<P> {
    pool: ResourcePool,
    pending: PendingQueue<P>,
    /// Record per known job: pending, running, and bounded terminal history.
    records: HashMap<JobId, JobRecord>,
    running: HashMap<JobId, RunningJob>,
    completed_history: VecDeque<JobId>,
    failed_history: VecDeque<JobId>,
    /// Unbounded index of completed ids for dependency checks, decoupled
    /// from the bounded record cache so an evicted record cannot make a
    /// finished dependency look unfinished.
    completed_ids: HashSet<JobId>,
    audit: Option<Box<dyn AuditSink>>,
}

impl<P> SchedState<P> {
    fn audit(&mut self, id: JobId, job_type: &str, action: &str) {
        if let Some(sink) = self.audit.as_mut() {
            sink.record(build_audit_event(id, job_type, action));
        }
    }

    /// Retire a terminal record into a bounded FIFO history, evicting the
    /// oldest record when the history is at capacity. The completed-id index
    /// is never evicted.
    fn retire(&mut self, history_limit: usize, id: JobId, completed: bool) {
        let history = if completed {
            &mut self.completed_history
        } else {
            &mut self.failed_history
        };
        if history.len() >= history_limit {
            if let Some(evicted) = history.pop_front() {
                self.records.remove(&evicted);
            }
        }
        let history = if completed {
            &mut self.completed_history
        } else {
            &mut self.failed_history
        };
        history.push_back(id);
    }
}

/// Fault-isolating, resource-aware job scheduler.
///
/// Constructed explicitly and shared via `Arc`; [`Scheduler::start`] spawns
/// the admission loop and [`Scheduler::stop`] shuts it down. All query and
/// coordination calls are non-blocking.
pub struct Scheduler<P, E, S>
where
    P: JobPayload,
    E: JobExecutor<P>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    limits: SchedulerLimits,
    state: Arc<Mutex<SchedState<P>>>,
    breaker: Arc<CircuitBreaker>,
    executor: E,
    spawner: S,
    counters: Arc<SchedulerCounters>,
    shutdown: Arc<AtomicBool>,
}

impl<P, E, S> Scheduler<P, E, S>
where
    P: JobPayload,
    E: JobExecutor<P>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    /// Create a scheduler over the given resource capacity, executing
    /// payloads through `breaker` via `executor`.
    #[must_use]
    pub fn new(
        limits: SchedulerLimits,
        capacity: HashMap<ResourceKind, u64>,
        breaker: Arc<CircuitBreaker>,
        executor: E,
        spawner: S,
    ) -> Self {
        let max_queue = limits.max_queue_size;
        Self {
            limits,
            state: Arc::new(Mutex::new(SchedState {
                pool: ResourcePool::new(capacity),
                pending: PendingQueue::new(max_queue),
                records: HashMap::new(),
                running: HashMap::new(),
                completed_history: VecDeque::new(),
                failed_history: VecDeque::new(),
                completed_ids: HashSet::new(),
                audit: None,
            })),
            breaker,
            executor,
            spawner,
            counters: Arc::new(SchedulerCounters::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach an audit sink recording submit/reject/admit/complete/fail/
    /// cancel actions.
    #[must_use]
    pub fn with_audit(self, sink: Box<dyn AuditSink>) -> Self {
        self.state.lock().audit = Some(sink);
        self
    }

    /// Spawn the admission loop. Ticks at the configured interval until
    /// [`Scheduler::stop`] is called; missed ticks are skipped, not bursted.
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let tick_interval = self.limits.tick_interval;
        self.spawner.spawn(async move {
            let mut interval = tokio::time::interval(tick_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(?tick_interval, "admission loop started");
            loop {
                interval.tick().await;
                if this.shutdown.load(Ordering::Acquire) {
                    break;
                }
                this.tick();
            }
            info!("admission loop stopped");
        });
    }

    /// Signal the admission loop to exit after its current tick. Running
    /// execution units finish on their own and still release resources.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Submit a job. Returns `false` — never blocks, never panics — when the
    /// pending queue is full (explicit backpressure) or the id is already
    /// known. On acceptance the job is `Queued`, inserted in priority order
    /// with ties broken by submission order.
    pub fn submit(&self, job: Job<P>) -> bool {
        let id = job.meta.id;
        let job_type = job.meta.job_type.clone();
        let mut st = self.state.lock();
        if st.records.contains_key(&id) {
            warn!(job_id = %id, "submission rejected: duplicate job id");
            return false;
        }
        if st.pending.len() >= self.limits.max_queue_size {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            st.audit(id, &job_type, "reject");
            warn!(
                job_id = %id,
                depth = st.pending.len(),
                capacity = self.limits.max_queue_size,
                "submission rejected: queue full"
            );
            return false;
        }

        let mut record = JobRecord::new(job.meta.clone());
        record.advance(JobStatus::Queued);
        st.records.insert(id, record);
        if !st.pending.push(job) {
            // Depth was checked above; only reachable if the queue bound and
            // the limit ever disagree.
            st.records.remove(&id);
            return false;
        }
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        st.audit(id, &job_type, "submit");
        debug!(job_id = %id, job_type = %job_type, depth = st.pending.len(), "job queued");
        true
    }

    /// One admission pass: scan the pending queue in priority order and
    /// admit every admissible job until the concurrency limit is reached.
    ///
    /// A job whose dependencies are unmet or whose resources do not fit is
    /// skipped for this tick only — admissible lower-priority jobs behind it
    /// may be admitted ahead of it in the same pass. Priority order is
    /// preserved without letting one stuck job block the queue, at the cost
    /// of not being globally optimal bin-packing.
    pub fn tick(&self) {
        let mut launches = Vec::new();
        {
            let mut st = self.state.lock();
            let st = &mut *st;
            let mut idx = 0;
            // Admitted jobs enter `st.running` immediately, so the running
            // set alone is the concurrency count for this pass.
            while st.running.len() < self.limits.max_concurrent_jobs && idx < st.pending.len() {
                let admissible = {
                    let Some(job) = st.pending.get(idx) else { break };
                    let deps_met = job
                        .meta
                        .depends_on
                        .iter()
                        .all(|dep| st.completed_ids.contains(dep));
                    deps_met && st.pool.can_allocate(&job.meta.requirements)
                };
                if !admissible {
                    idx += 1;
                    continue;
                }

                let job = st.pending.remove(idx);
                let id = job.meta.id;
                // can_allocate passed in this same critical section, so this
                // cannot fail; handle it defensively anyway.
                if let Err(err) = st.pool.allocate(&job.meta.requirements) {
                    warn!(job_id = %id, %err, "allocation failed after passing admissibility");
                    continue;
                }
                if let Some(record) = st.records.get_mut(&id) {
                    record.advance(JobStatus::Scheduled);
                }
                let (cancel_tx, cancel_rx) = oneshot::channel();
                st.running.insert(
                    id,
                    RunningJob {
                        cancel: Some(cancel_tx),
                        requirements: job.meta.requirements.clone(),
                    },
                );
                st.audit(id, &job.meta.job_type, "admit");
                debug!(job_id = %id, priority = ?job.meta.priority, "job admitted");
                launches.push((job, cancel_rx));
            }
        }

        for (job, cancel_rx) in launches {
            self.launch(job, cancel_rx);
        }
    }

    /// Spawn the execution unit for an admitted job.
    fn launch(&self, job: Job<P>, cancel_rx: oneshot::Receiver<()>) {
        let state = Arc::clone(&self.state);
        let counters = Arc::clone(&self.counters);
        let breaker = Arc::clone(&self.breaker);
        let executor = self.executor.clone();
        let history_limit = self.limits.history_limit;
        let Job { meta, payload } = job;

        self.spawner.spawn(async move {
            let id = meta.id;
            {
                let mut st = state.lock();
                if let Some(record) = st.records.get_mut(&id) {
                    record.advance(JobStatus::Running);
                }
            }
            debug!(job_id = %id, job_type = %meta.job_type, "executing job");

            // Two independent timeouts: the breaker's call timeout protects
            // the shared downstream resource from one slow caller; this
            // job-level timeout protects the job's own SLA and guarantees
            // eventual resource release even if the payload never reports
            // back.
            let job_timeout = Duration::from_millis(meta.timeout_ms);
            let exec_meta = meta.clone();
            let exec = breaker.call(move || async move {
                executor.execute(payload, exec_meta).await
            });

            let outcome = tokio::select! {
                res = tokio::time::timeout(job_timeout, exec) => match res {
                    Ok(Ok(value)) => Outcome::Completed(value),
                    Ok(Err(err)) => Outcome::Failed {
                        timed_out: matches!(err, BreakerError::Timeout { .. }),
                        error: err.to_string(),
                    },
                    Err(_) => Outcome::JobTimeout(job_timeout),
                },
                _ = cancel_rx => Outcome::Cancelled,
            };

            Self::finish(&state, &counters, history_limit, id, outcome);
        });
    }

    /// Record a terminal outcome. Resource release and running-set removal
    /// happen unconditionally, exactly once, on every exit path; the running
    /// entry is the source of truth for what was reserved at admission.
    fn finish(
        state: &Mutex<SchedState<P>>,
        counters: &SchedulerCounters,
        history_limit: usize,
        id: JobId,
        outcome: Outcome,
    ) {
        let mut st = state.lock();
        if let Some(running) = st.running.remove(&id) {
            st.pool.release(&running.requirements);
        }
        let job_type = st
            .records
            .get(&id)
            .map(|r| r.meta.job_type.clone())
            .unwrap_or_default();

        match outcome {
            Outcome::Completed(value) => {
                if let Some(record) = st.records.get_mut(&id) {
                    record.advance(JobStatus::Completed);
                    record.result = Some(value);
                }
                st.completed_ids.insert(id);
                st.retire(history_limit, id, true);
                counters.completed.fetch_add(1, Ordering::Relaxed);
                st.audit(id, &job_type, "complete");
                info!(job_id = %id, "job completed");
            }
            Outcome::Failed { error, timed_out } => {
                if let Some(record) = st.records.get_mut(&id) {
                    record.advance(JobStatus::Failed);
                    record.error = Some(error.clone());
                }
                st.retire(history_limit, id, false);
                counters.failed.fetch_add(1, Ordering::Relaxed);
                if timed_out {
                    counters.timed_out.fetch_add(1, Ordering::Relaxed);
                }
                st.audit(id, &job_type, "fail");
                warn!(job_id = %id, %error, "job failed");
            }
            Outcome::JobTimeout(after) => {
                if let Some(record) = st.records.get_mut(&id) {
                    record.advance(JobStatus::Failed);
                    record.error = Some(format!("job timed out after {after:?}"));
                }
                st.retire(history_limit, id, false);
                counters.failed.fetch_add(1, Ordering::Relaxed);
                counters.timed_out.fetch_add(1, Ordering::Relaxed);
                st.audit(id, &job_type, "fail");
                warn!(job_id = %id, ?after, "job timed out");
            }
            Outcome::Cancelled => {
                if let Some(record) = st.records.get_mut(&id) {
                    record.advance(JobStatus::Cancelled);
                }
                st.retire(history_limit, id, false);
                counters.cancelled.fetch_add(1, Ordering::Relaxed);
                st.audit(id, &job_type, "cancel");
                info!(job_id = %id, "running job cancelled");
            }
        }
    }

    /// Cancel a job. Pending jobs leave the queue immediately with no
    /// resource effect; running jobs get a cooperative signal and their
    /// cleanup (including resource release) still runs exactly once, ending
    /// in `Cancelled`, not `Failed`. Returns whether the job was found in a
    /// cancellable state.
    pub fn cancel(&self, id: JobId) -> bool {
        let mut st = self.state.lock();
        if let Some(job) = st.pending.remove_by_id(id) {
            if let Some(record) = st.records.get_mut(&id) {
                record.advance(JobStatus::Cancelled);
            }
            st.retire(self.limits.history_limit, id, false);
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            st.audit(id, &job.meta.job_type, "cancel");
            info!(job_id = %id, "pending job cancelled");
            return true;
        }
        if let Some(running) = st.running.get_mut(&id) {
            if let Some(signal) = running.cancel.take() {
                let _ = signal.send(());
                info!(job_id = %id, "cancellation signaled to running job");
                return true;
            }
        }
        false
    }

    /// Temporarily raise the priority of pending jobs whose
    /// `related_to` metadata matches, by one tier, then re-sort the queue.
    /// Jobs already admitted are unaffected. Returns how many jobs were
    /// boosted.
    pub fn boost_related(&self, related_to: &str) -> usize {
        let mut st = self.state.lock();
        let st = &mut *st;
        let boosted = st.pending.boost(|job| {
            job.meta
                .metadata
                .get("related_to")
                .is_some_and(|v| v == related_to)
        });
        if boosted > 0 {
            // Keep the records' priorities in sync with the re-sorted queue.
            for job in st.pending.iter() {
                if let Some(record) = st.records.get_mut(&job.meta.id) {
                    record.meta.priority = job.meta.priority;
                }
            }
            info!(related_to, boosted, "boosted pending jobs");
        }
        boosted
    }

    /// Current status, or `None` for a job the scheduler does not know
    /// (distinct from a job that failed).
    #[must_use]
    pub fn job_status(&self, id: JobId) -> Option<JobStatus> {
        self.state.lock().records.get(&id).map(|r| r.status)
    }

    /// Full record snapshot for a known job.
    #[must_use]
    pub fn job_record(&self, id: JobId) -> Option<JobRecord> {
        self.state.lock().records.get(&id).cloned()
    }

    /// Result of a completed job, if known and completed.
    #[must_use]
    pub fn job_result(&self, id: JobId) -> Option<serde_json::Value> {
        self.state
            .lock()
            .records
            .get(&id)
            .and_then(|r| r.result.clone())
    }

    /// Derived statistics snapshot.
    #[must_use]
    pub fn statistics(&self) -> SchedulerStats {
        let st = self.state.lock();
        SchedulerStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            queue_depth: st.pending.len(),
            queue_capacity: st.pending.max_depth(),
            running: st.running.len(),
            max_concurrent_jobs: self.limits.max_concurrent_jobs,
            utilization: st.pool.utilization(),
            breaker_state: self.breaker.state(),
        }
    }

    /// Resource ledger snapshot.
    #[must_use]
    pub fn resource_status(&self) -> ResourceStatus {
        self.state.lock().pool.status()
    }

    /// The shared circuit breaker this scheduler executes through.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> &SchedulerLimits {
        &self.limits
    }
}
