//! Resource ledger: available-vs-total bookkeeping per capacity dimension.
//!
//! The pool does no physical provisioning. It is deliberately lock-free of
//! its own locking: the scheduler serializes every access behind its single
//! state mutex so that the admissibility check and the allocation happen in
//! the same critical section (no check-then-act race between ticks).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;
use crate::core::job::{ResourceKind, ResourceRequirements};

/// Snapshot of one dimension's ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionStatus {
    /// Configured capacity.
    pub total: u64,
    /// Capacity not currently reserved.
    pub available: u64,
}

/// Read-only snapshot of the whole ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Per-dimension totals and availability.
    pub dimensions: HashMap<ResourceKind, DimensionStatus>,
}

/// Ledger of available vs. total capacity across named dimensions.
///
/// Invariant: `0 <= available <= total` in every dimension, always.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    total: HashMap<ResourceKind, u64>,
    available: HashMap<ResourceKind, u64>,
}

impl ResourcePool {
    /// Create a pool from per-dimension capacities.
    #[must_use]
    pub fn new(capacity: HashMap<ResourceKind, u64>) -> Self {
        Self {
            available: capacity.clone(),
            total: capacity,
        }
    }

    /// Whether every required dimension has enough available capacity.
    /// Pure check, no mutation. A requirement in a dimension the pool does
    /// not track at all is only satisfiable when the amount is 0.
    #[must_use]
    pub fn can_allocate(&self, requirements: &ResourceRequirements) -> bool {
        requirements.amounts.iter().all(|(kind, &amount)| {
            amount == 0 || self.available.get(kind).is_some_and(|&a| a >= amount)
        })
    }

    /// Decrement every required dimension. Must only be called immediately
    /// after a passing [`Self::can_allocate`] inside the same critical
    /// section; a failing dimension here means that contract was broken, and
    /// the ledger is left untouched.
    pub fn allocate(&mut self, requirements: &ResourceRequirements) -> Result<(), SchedulerError> {
        for (kind, &amount) in &requirements.amounts {
            let available = self.available.get(kind).copied().unwrap_or(0);
            if amount > available {
                return Err(SchedulerError::InsufficientCapacity {
                    kind: *kind,
                    requested: amount,
                    available,
                });
            }
        }
        for (kind, &amount) in &requirements.amounts {
            if amount > 0 {
                if let Some(a) = self.available.get_mut(kind) {
                    *a -= amount;
                }
            }
        }
        Ok(())
    }

    /// Increment every required dimension, clamped to the dimension's total
    /// so a duplicate or partial release can never corrupt the ledger.
    pub fn release(&mut self, requirements: &ResourceRequirements) {
        for (kind, &amount) in &requirements.amounts {
            if amount == 0 {
                continue;
            }
            let Some(total) = self.total.get(kind).copied() else {
                continue;
            };
            if let Some(a) = self.available.get_mut(kind) {
                let restored = a.saturating_add(amount);
                if restored > total {
                    tracing::warn!(
                        ?kind,
                        amount,
                        available = *a,
                        total,
                        "release exceeds total, clamping"
                    );
                }
                *a = restored.min(total);
            }
        }
    }

    /// Fraction of each dimension currently reserved (`1 - available/total`).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> HashMap<ResourceKind, f64> {
        self.total
            .iter()
            .map(|(kind, &total)| {
                let available = self.available.get(kind).copied().unwrap_or(0);
                let used = if total == 0 {
                    0.0
                } else {
                    1.0 - (available as f64 / total as f64)
                };
                (*kind, used)
            })
            .collect()
    }

    /// Read-only snapshot of totals and availability.
    #[must_use]
    pub fn status(&self) -> ResourceStatus {
        ResourceStatus {
            dimensions: self
                .total
                .iter()
                .map(|(kind, &total)| {
                    let available = self.available.get(kind).copied().unwrap_or(0);
                    (*kind, DimensionStatus { total, available })
                })
                .collect(),
        }
    }
}
