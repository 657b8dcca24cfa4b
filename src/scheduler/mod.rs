// src/scheduler/mod.rs

//! Ticker / scheduler.
//!
//! - [`ticker`]: the pure per-entity state machine (Stopped/Running,
//!   counters, self-disable after repeated failures).
//! - [`entity`]: the observable entity state and attributes.
//! - [`registry`]: the async shell. Owns the entity registry, one execution
//!   lock per entity, and the periodic timer tasks.

pub mod entity;
pub mod registry;
pub mod ticker;

pub use entity::{EntityAttributes, EntityRuntime};
pub use registry::{ConfigUpdate, ExecutionOutcome, Scheduler};
pub use ticker::{FailureVerdict, TickerInfo, TickerState};

/// Consecutive failures after which a ticker stops itself.
pub const FAILURE_THRESHOLD: u32 = 5;
pub const MIN_INTERVAL_SECONDS: i64 = 1;
pub const MAX_INTERVAL_SECONDS: i64 = 3600;
pub const DEFAULT_INTERVAL_SECONDS: i64 = crate::storage::DEFAULT_INTERVAL_SECONDS;

/// Clamp a positive interval into `[MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS]`.
pub fn clamp_interval(seconds: i64) -> i64 {
    seconds.clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS)
}
