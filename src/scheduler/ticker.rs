// src/scheduler/ticker.rs

//! Per-entity ticker state machine.
//!
//! Pure bookkeeping: no timers and no locks. The registry owns one
//! [`TickerState`] per started ticker and drives it from the timer task and
//! the execution path; everything here takes `now` explicitly so it can be
//! stepped in tests.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::FAILURE_THRESHOLD;

/// Whether a failure left the ticker running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    KeepRunning,
    /// The consecutive-failure threshold was reached; the ticker stopped.
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickerState {
    pub entity_id: String,
    pub period: Duration,
    pub is_running: bool,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub consecutive_error_count: u32,
}

/// Read-only view exposed through `ticker_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerInfo {
    pub entity_id: String,
    /// Whole seconds.
    pub interval: u64,
    pub is_running: bool,
    pub last_execution: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
    pub execution_count: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub consecutive_error_count: u32,
}

impl TickerState {
    /// A freshly started ticker. Counters always start at zero, which is
    /// what makes `restart` reset them.
    pub fn start(entity_id: impl Into<String>, period: Duration, now: DateTime<Utc>) -> Self {
        Self {
            entity_id: entity_id.into(),
            period,
            is_running: true,
            last_execution: None,
            next_execution: after(now, period),
            execution_count: 0,
            error_count: 0,
            last_error: None,
            consecutive_error_count: 0,
        }
    }

    pub fn stop(&mut self) {
        self.is_running = false;
        self.next_execution = None;
    }

    /// A timer fire. Returns `false` (and changes nothing) when the ticker
    /// is no longer running.
    pub fn on_fire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_running {
            return false;
        }
        self.next_execution = after(now, self.period);
        true
    }

    /// An execution acquired the lock and is about to evaluate.
    pub fn on_begin(&mut self, now: DateTime<Utc>) {
        self.last_execution = Some(now);
    }

    pub fn on_success(&mut self) {
        self.execution_count += 1;
        self.consecutive_error_count = 0;
        self.last_error = None;
    }

    pub fn on_failure(&mut self, message: impl Into<String>) -> FailureVerdict {
        self.error_count += 1;
        self.consecutive_error_count += 1;
        self.last_error = Some(message.into());

        if self.is_running && self.consecutive_error_count >= FAILURE_THRESHOLD {
            self.stop();
            FailureVerdict::Disabled
        } else {
            FailureVerdict::KeepRunning
        }
    }

    pub fn info(&self) -> TickerInfo {
        TickerInfo {
            entity_id: self.entity_id.clone(),
            interval: self.period.as_secs(),
            is_running: self.is_running,
            last_execution: self.last_execution,
            next_execution: self.next_execution,
            execution_count: self.execution_count,
            error_count: self.error_count,
            last_error: self.last_error.clone(),
            consecutive_error_count: self.consecutive_error_count,
        }
    }
}

fn after(now: DateTime<Utc>, period: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(period)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn ticker() -> TickerState {
        TickerState::start("demo", Duration::from_secs(30), at(0))
    }

    #[test]
    fn start_schedules_next_execution() {
        let t = ticker();
        assert!(t.is_running);
        assert_eq!(t.next_execution, Some(at(30)));
        assert_eq!(t.info().interval, 30);
    }

    #[test]
    fn fire_advances_next_execution_only_while_running() {
        let mut t = ticker();
        assert!(t.on_fire(at(30)));
        assert_eq!(t.next_execution, Some(at(60)));

        t.stop();
        assert!(!t.on_fire(at(60)));
        assert_eq!(t.next_execution, None);
    }

    #[test]
    fn success_resets_consecutive_failures() {
        let mut t = ticker();
        t.on_failure("a");
        t.on_failure("b");
        t.on_success();
        assert_eq!(t.execution_count, 1);
        assert_eq!(t.error_count, 2);
        assert_eq!(t.consecutive_error_count, 0);
        assert_eq!(t.last_error, None);
    }

    #[test]
    fn fifth_consecutive_failure_disables() {
        let mut t = ticker();
        for i in 1..FAILURE_THRESHOLD {
            assert_eq!(t.on_failure(format!("e{i}")), FailureVerdict::KeepRunning);
        }
        assert_eq!(t.on_failure("last"), FailureVerdict::Disabled);
        assert!(!t.is_running);
        assert_eq!(t.last_error.as_deref(), Some("last"));
        assert_eq!(t.error_count, u64::from(FAILURE_THRESHOLD));
    }

    #[test]
    fn interleaved_success_keeps_it_alive() {
        let mut t = ticker();
        for _ in 0..3 {
            for _ in 1..FAILURE_THRESHOLD {
                t.on_failure("x");
            }
            t.on_success();
        }
        assert!(t.is_running);
        assert_eq!(t.error_count, 3 * u64::from(FAILURE_THRESHOLD - 1));
    }

    #[test]
    fn restart_is_a_fresh_ticker() {
        let mut t = ticker();
        t.on_success();
        t.on_failure("x");
        let restarted = TickerState::start(t.entity_id.clone(), Duration::from_secs(5), at(100));
        assert_eq!(restarted.execution_count, 0);
        assert_eq!(restarted.error_count, 0);
        assert_eq!(restarted.consecutive_error_count, 0);
        assert_eq!(restarted.next_execution, Some(at(105)));
    }
}
