//! Latest distance sample, shared between the loops

use crate::lock;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    distance_cm: Option<f64>,
    taken_at: Option<Instant>,
}

/// Single-slot distance cell. Writers replace, readers copy; the lock is
/// only held for the copy.
#[derive(Debug, Clone, Default)]
pub struct SharedDistance {
    slot: Arc<Mutex<Slot>>,
}

impl SharedDistance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current sample
    pub fn publish(&self, distance_cm: Option<f64>) {
        *lock(&self.slot) = Slot {
            distance_cm,
            taken_at: Some(Instant::now()),
        };
    }

    /// Latest sample, however old
    pub fn current(&self) -> Option<f64> {
        lock(&self.slot).distance_cm
    }

    /// Latest sample if it was published within `max_age`
    pub fn current_within(&self, max_age: Duration) -> Option<f64> {
        let slot = *lock(&self.slot);
        match slot.taken_at {
            Some(at) if at.elapsed() <= max_age => slot.distance_cm,
            _ => None,
        }
    }

    /// When the latest sample was published
    pub fn published_at(&self) -> Option<Instant> {
        lock(&self.slot).taken_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_until_published() {
        let shared = SharedDistance::new();
        assert_eq!(shared.current(), None);
        assert!(shared.published_at().is_none());

        shared.publish(Some(42.0));
        assert_eq!(shared.current(), Some(42.0));
        shared.publish(None);
        assert_eq!(shared.current(), None);
    }

    #[test]
    fn test_stale_sample_reads_as_none() {
        let shared = SharedDistance::new();
        shared.publish(Some(50.0));
        assert_eq!(shared.current_within(Duration::from_secs(10)), Some(50.0));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(shared.current_within(Duration::from_millis(5)), None);
        assert_eq!(shared.current(), Some(50.0));
    }

    #[test]
    fn test_clones_share_slot() {
        let writer = SharedDistance::new();
        let reader = writer.clone();
        let handle = thread::spawn(move || writer.publish(Some(12.5)));
        handle.join().unwrap();
        assert_eq!(reader.current(), Some(12.5));
    }
}
