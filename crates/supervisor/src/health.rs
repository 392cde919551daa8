//! Per-loop health tracking
//!
//! Written by the owning loop, read by the supervisor for status snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Starting,
    Running,
    /// Last iteration failed; waiting out the backoff
    ErrorBackoff,
    Stopped,
    /// Gave up after too many consecutive errors
    Exhausted,
}

impl LoopState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LoopState::Starting,
            1 => LoopState::Running,
            2 => LoopState::ErrorBackoff,
            3 => LoopState::Stopped,
            _ => LoopState::Exhausted,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::Starting => 0,
            LoopState::Running => 1,
            LoopState::ErrorBackoff => 2,
            LoopState::Stopped => 3,
            LoopState::Exhausted => 4,
        }
    }

    /// Whether the loop has finished for good
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Stopped | LoopState::Exhausted)
    }
}

/// Point-in-time view of one loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopHealth {
    pub state: LoopState,
    /// Failures since the last successful iteration
    pub consecutive_errors: u32,
    /// Failures since start
    pub total_errors: u64,
    /// Error ceiling for this loop
    pub max_errors: u32,
    /// Peripheral reinitializations attempted
    pub reinit_attempts: u32,
}

/// Lock-free health record shared between a loop and the supervisor
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    max_errors: u32,
    state: AtomicU8,
    errors: AtomicU32,
    total_errors: AtomicU64,
    reinit_attempts: AtomicU32,
}

impl ComponentHealth {
    pub fn new(name: &'static str, max_errors: u32) -> Self {
        Self {
            name,
            max_errors,
            state: AtomicU8::new(LoopState::Starting.as_u8()),
            errors: AtomicU32::new(0),
            total_errors: AtomicU64::new(0),
            reinit_attempts: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn max_errors(&self) -> u32 {
        self.max_errors
    }

    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: LoopState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Successful iteration: clear the error run
    pub fn record_success(&self) {
        self.errors.store(0, Ordering::Release);
        self.set_state(LoopState::Running);
    }

    /// Failed iteration; returns the new consecutive error count
    pub fn record_error(&self) -> u32 {
        self.total_errors.fetch_add(1, Ordering::AcqRel);
        self.set_state(LoopState::ErrorBackoff);
        metrics::counter!("cane_loop_errors_total", "loop" => self.name).increment(1);
        self.errors.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Forget the current error run without an iteration (after a reinit)
    pub fn reset_errors(&self) {
        self.errors.store(0, Ordering::Release);
    }

    pub fn record_reinit(&self) {
        self.reinit_attempts.fetch_add(1, Ordering::AcqRel);
        metrics::counter!("cane_loop_reinits_total", "loop" => self.name).increment(1);
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> LoopHealth {
        LoopHealth {
            state: self.state(),
            consecutive_errors: self.errors.load(Ordering::Acquire),
            total_errors: self.total_errors.load(Ordering::Acquire),
            max_errors: self.max_errors,
            reinit_attempts: self.reinit_attempts.load(Ordering::Acquire),
        }
    }
}
