//! Audit sink for scheduler lifecycle events.

use std::collections::VecDeque;

use crate::core::job::JobId;
use crate::util::clock::now_ms;

/// One recorded scheduler action.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Related job identifier.
    pub job_id: JobId,
    /// Job type tag.
    pub job_type: String,
    /// Action taken (submit, reject, admit, complete, fail, cancel).
    pub action: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink with a bounded buffer (oldest evicted first).
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a sink that retains at most `max_events` events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    job_id: JobId,
    job_type: impl Into<String>,
    action: impl Into<String>,
) -> AuditEvent {
    AuditEvent {
        job_id,
        job_type: job_type.into(),
        action: action.into(),
        created_at_ms: now_ms(),
    }
}
