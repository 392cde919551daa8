//! Smart Cane Supervisor
//!
//! Runs the two control loops of the device and keeps them alive:
//! - Feedback loop (dedicated thread, ~20 Hz): range sensor → zones → motor
//! - Alert loop (tokio task, ~1 Hz): shared distance → vision → gate → speech
//!
//! The loops share exactly one value, the latest distance sample. Each loop
//! counts consecutive failures; the feedback loop gives up (motor off) at its
//! ceiling, the alert loop reinitializes vision and keeps going.

pub mod alert_loop;
pub mod config;
pub mod error;
pub mod feedback;
pub mod health;
pub mod logging;
pub mod retry;
pub mod shared;
pub mod sim;
pub mod speech;
mod supervisor;

pub use config::CaneConfig;
pub use error::{ConfigError, LoopError, SupervisorError};
pub use health::{ComponentHealth, LoopHealth, LoopState};
pub use retry::{retry, RetryPolicy};
pub use shared::SharedDistance;
pub use supervisor::{Peripherals, StatusSnapshot, Supervisor};

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

/// Lock a mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Like [`lock`], but `None` instead of waiting on a current holder
pub(crate) fn try_lock<T: ?Sized>(m: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match m.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}
