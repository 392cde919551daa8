//! Bounded retry for peripheral acquisition

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first (default: 5)
    pub max_attempts: u32,
    /// Pause between attempts (default: 1000ms)
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: backoff.as_millis() as u64,
        }
    }

    /// A single attempt, no waiting
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// Blocks the calling thread between attempts; call from a blocking context.
/// `op` receives the 1-based attempt number. The last error is returned.
pub fn retry<T, E, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut(u32) -> Result<T, E>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}", what, attempt);
                }
                return Ok(value);
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "{} failed (attempt {}/{}): {}, retrying in {:?}",
                    what,
                    attempt,
                    attempts,
                    e,
                    policy.backoff()
                );
                thread::sleep(policy.backoff());
                attempt += 1;
            }
            Err(e) => {
                error!("{} failed after {} attempts: {}", what, attempts, e);
                return Err(e);
            }
        }
    }
}
