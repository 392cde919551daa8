//! Alert Gate Implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// State of an alert key
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Last time this alert was fired
    pub last_fired: Instant,
    /// Number of times fired since the key was created
    pub fire_count: usize,
}

/// Outcome of asking the gate whether an alert may go out
#[derive(Debug)]
pub enum Admission {
    /// Deliver the alert; drop the ticket when delivery finishes
    Fire(DeliveryTicket),
    /// Same key fired too recently
    Cooldown,
    /// Another delivery is still speaking
    InFlight,
}

impl Admission {
    /// Whether the alert was admitted
    pub fn is_fire(&self) -> bool {
        matches!(self, Admission::Fire(_))
    }
}

/// Marks one delivery as in flight until dropped
#[derive(Debug)]
pub struct DeliveryTicket {
    in_flight: Arc<AtomicUsize>,
    key: String,
}

impl DeliveryTicket {
    /// Key this delivery belongs to
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for DeliveryTicket {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug!("Delivery finished: {}", self.key);
    }
}

/// Read-only view of in-flight deliveries, shareable across threads
#[derive(Debug, Clone)]
pub struct DeliveryTracker {
    in_flight: Arc<AtomicUsize>,
}

impl DeliveryTracker {
    /// Number of deliveries still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Cooldown and non-overlap gate for alert keys
pub struct AlertGate {
    /// Minimum time between non-forced fires of one key
    cooldown: Duration,
    /// Alert states by key
    states: HashMap<String, AlertState>,
    /// Deliveries currently speaking
    in_flight: Arc<AtomicUsize>,
}

impl AlertGate {
    /// Create a new gate
    pub fn new(cooldown: Duration) -> Self {
        info!("Creating alert gate with {:?} cooldown", cooldown);
        Self {
            cooldown,
            states: HashMap::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cooldown-only decision for `key` at `now`.
    ///
    /// A forced fire always succeeds and restarts the key's cooldown window.
    pub fn try_fire(&mut self, key: &str, now: Instant, force: bool) -> bool {
        if force {
            self.reset(key);
            self.record(key, now);
            return true;
        }

        if let Some(state) = self.states.get(key) {
            if now.saturating_duration_since(state.last_fired) < self.cooldown {
                debug!("Alert suppressed: {} in cooldown", key);
                return false;
            }
        }

        self.record(key, now);
        true
    }

    /// Full admission check: non-overlap first, then cooldown.
    ///
    /// A non-forced alert blocked by an in-flight delivery leaves the
    /// cooldown state untouched.
    pub fn admit(&mut self, key: &str, now: Instant, force: bool) -> Admission {
        if !force && self.in_flight.load(Ordering::Acquire) > 0 {
            debug!("Alert suppressed: {} while another delivery is in flight", key);
            return Admission::InFlight;
        }

        if !self.try_fire(key, now, force) {
            return Admission::Cooldown;
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        Admission::Fire(DeliveryTicket {
            in_flight: Arc::clone(&self.in_flight),
            key: key.to_string(),
        })
    }

    /// Forget `key`, so its next fire succeeds unconditionally
    pub fn reset(&mut self, key: &str) -> bool {
        let existed = self.states.remove(key).is_some();
        if existed {
            debug!("Alert cooldown reset: {}", key);
        }
        existed
    }

    /// State for a key, if it has fired
    pub fn state(&self, key: &str) -> Option<&AlertState> {
        self.states.get(key)
    }

    /// Handle for watching in-flight deliveries from another thread
    pub fn tracker(&self) -> DeliveryTracker {
        DeliveryTracker {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Number of deliveries still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Configured cooldown
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Clear all alert states
    pub fn clear(&mut self) {
        self.states.clear();
    }

    fn record(&mut self, key: &str, now: Instant) {
        let state = self.states.entry(key.to_string()).or_insert(AlertState {
            last_fired: now,
            fire_count: 0,
        });
        state.last_fired = now;
        state.fire_count += 1;
        debug!("Alert recorded: {} (count: {})", key, state.fire_count);
    }
}
