//! Bounded pending queue, ordered by priority with stable FIFO ties.
//!
//! The admission tick scans this queue in order and may skip entries that are
//! not yet admissible (unmet dependencies, insufficient resources), so the
//! backing store is a sorted `Vec` rather than a heap: a heap only exposes
//! its head, but the scan needs indexed access and mid-queue removal.

use crate::core::job::{Job, JobId};

/// One queued entry. `seq` preserves submission order within a tier.
#[derive(Debug)]
pub struct QueuedJob<P> {
    seq: u64,
    /// The queued job.
    pub job: Job<P>,
}

/// Priority-ordered pending queue with a hard depth bound.
#[derive(Debug)]
pub struct PendingQueue<P> {
    entries: Vec<QueuedJob<P>>,
    max_depth: usize,
    next_seq: u64,
}

impl<P> PendingQueue<P> {
    /// Create a queue that rejects pushes beyond `max_depth`.
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_depth.min(1024)),
            max_depth,
            next_seq: 0,
        }
    }

    /// Insert in priority order, ties broken by submission order. Returns
    /// `false` without inserting when the queue is at capacity.
    pub fn push(&mut self, job: Job<P>) -> bool {
        if self.entries.len() >= self.max_depth {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        // First index whose priority is strictly less urgent; inserting there
        // lands after every same-priority entry, keeping FIFO within a tier.
        let pos = self
            .entries
            .partition_point(|e| e.job.meta.priority <= job.meta.priority);
        self.entries.insert(pos, QueuedJob { seq, job });
        true
    }

    /// Job at scan position `idx`.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&Job<P>> {
        self.entries.get(idx).map(|e| &e.job)
    }

    /// Remove and return the job at scan position `idx`.
    pub fn remove(&mut self, idx: usize) -> Job<P> {
        self.entries.remove(idx).job
    }

    /// Remove a job by id (cancellation path).
    pub fn remove_by_id(&mut self, id: JobId) -> Option<Job<P>> {
        let idx = self.entries.iter().position(|e| e.job.meta.id == id)?;
        Some(self.entries.remove(idx).job)
    }

    /// Raise the priority of every job matching `predicate` by one tier and
    /// re-sort the queue (stable on submission order). Returns how many jobs
    /// were boosted.
    pub fn boost<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Job<P>) -> bool,
    {
        let mut boosted = 0;
        for entry in &mut self.entries {
            if predicate(&entry.job) {
                entry.job.meta.priority = entry.job.meta.priority.boosted();
                boosted += 1;
            }
        }
        if boosted > 0 {
            self.entries
                .sort_by_key(|e| (e.job.meta.priority, e.seq));
        }
        boosted
    }

    /// Current depth.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured depth bound.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Ids in current scan order.
    #[must_use]
    pub fn ids(&self) -> Vec<JobId> {
        self.entries.iter().map(|e| e.job.meta.id).collect()
    }

    /// Iterate jobs in current scan order.
    pub fn iter(&self) -> impl Iterator<Item = &Job<P>> {
        self.entries.iter().map(|e| &e.job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::job::{Job, Priority};

    fn make_job(name: &str, priority: Priority) -> Job<String> {
        Job::new("test", name.to_string()).with_priority(priority)
    }

    fn names(q: &PendingQueue<String>) -> Vec<String> {
        (0..q.len())
            .map(|i| q.get(i).unwrap().payload.clone())
            .collect()
    }

    #[test]
    fn test_priority_ordering() {
        let mut q = PendingQueue::new(100);
        assert!(q.push(make_job("low", Priority::Low)));
        assert!(q.push(make_job("critical", Priority::Critical)));
        assert!(q.push(make_job("normal", Priority::Normal)));
        assert!(q.push(make_job("background", Priority::Background)));
        assert!(q.push(make_job("high", Priority::High)));

        assert_eq!(
            names(&q),
            vec!["critical", "high", "normal", "low", "background"]
        );
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut q = PendingQueue::new(100);
        q.push(make_job("a", Priority::Normal));
        q.push(make_job("b", Priority::Normal));
        q.push(make_job("c", Priority::Normal));
        assert_eq!(names(&q), vec!["a", "b", "c"]);

        // A later critical job still jumps ahead of all of them.
        q.push(make_job("d", Priority::Critical));
        assert_eq!(names(&q), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_depth_bound() {
        let mut q = PendingQueue::new(2);
        assert!(q.push(make_job("a", Priority::Normal)));
        assert!(q.push(make_job("b", Priority::Normal)));
        assert!(!q.push(make_job("c", Priority::Critical)));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_remove_by_id() {
        let mut q = PendingQueue::new(10);
        let job = make_job("a", Priority::Normal);
        let id = job.meta.id;
        q.push(job);
        q.push(make_job("b", Priority::Normal));

        let removed = q.remove_by_id(id).unwrap();
        assert_eq!(removed.payload, "a");
        assert!(q.remove_by_id(id).is_none());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_boost_resorts_stably() {
        let mut q = PendingQueue::new(10);
        q.push(make_job("a", Priority::Normal));
        q.push(make_job("batch1", Priority::Low));
        q.push(make_job("batch2", Priority::Low));

        let boosted = q.boost(|j| j.payload.starts_with("batch"));
        assert_eq!(boosted, 2);
        // Both land in Normal, after "a" (older seq) and in submission order.
        assert_eq!(names(&q), vec!["a", "batch1", "batch2"]);
        assert_eq!(q.get(1).unwrap().meta.priority, Priority::Normal);
    }
}
