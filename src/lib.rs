//! # Atlas Scheduler
//!
//! A fault-isolating, resource-aware async job scheduler for heterogeneous
//! workloads.
//!
//! This library provides a dedicated scheduling layer that admits jobs against
//! a multi-dimensional resource ledger (GPUs, GPU memory, CPU cores, RAM) and
//! wraps every execution in a shared circuit breaker so a misbehaving
//! downstream dependency sheds load instead of cascading.
//!
//! ## Core Problem Solved
//!
//! Mixed AI/compute workloads have different failure and capacity modes than
//! typical web services:
//!
//! - **Scarce Accelerators**: A single oversized job must not starve the queue
//! - **Cascading Faults**: A flaky model endpoint should trip fast and recover
//!   probatively rather than soaking up concurrency
//! - **Priority Inversion**: Critical jobs must pass lower-priority work that
//!   arrived earlier, without starving it forever
//!
//! ## Key Features
//!
//! - **Resource-Aware Admission**: Jobs declare per-dimension requirements and
//!   are admitted only when every dimension fits, atomically
//! - **Priority Queue with Skip-Scan**: Non-admissible jobs are skipped so
//!   smaller jobs behind them can run
//! - **Circuit Breaker**: Closed/Open/Half-Open with consecutive-failure
//!   tripping, probe-based recovery, per-call timeouts, and a concurrency cap
//! - **Dependency Gating**: Jobs wait until every dependency has completed
//! - **Cooperative Cancellation**: Pending jobs are removed; running jobs are
//!   signalled and their resources reclaimed exactly once
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use atlas_scheduler::builders::build_scheduler;
//! use atlas_scheduler::config::SchedulerConfig;
//! use atlas_scheduler::core::{CircuitBreakerRegistry, Job};
//! use atlas_scheduler::runtime::TokioSpawner;
//!
//! let cfg = SchedulerConfig::load_from_env()?;
//! let registry = CircuitBreakerRegistry::new();
//! let scheduler = build_scheduler(
//!     &cfg,
//!     &registry,
//!     "inference-backend",
//!     my_executor, // implements JobExecutor
//!     TokioSpawner::current(),
//! )?;
//! scheduler.start();
//!
//! let job = Job::new("inference", my_payload);
//! let id = job.meta.id;
//! scheduler.submit(job);
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - Full integration tests
//! - `tests/circuit_breaker_test.rs` - Breaker state machine tests

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: jobs, queueing, capacity, and fault isolation.
pub mod core;
/// Configuration models for the scheduler and breaker.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Runtime adapters for spawning execution units.
pub mod runtime;
/// Shared utilities.
pub mod util;
