//! Alert policy configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Cooldown between repeated announcements of the same key (default: 5s)
    pub cooldown_secs: f64,
    /// Minimum detection confidence (default: 0.5)
    pub confidence_threshold: f32,
    /// Vision only runs when an obstacle is closer than this (default: 100cm)
    pub trigger_distance_cm: f64,
    /// Center objects closer than this are announced as ahead (default: 60cm)
    pub announce_distance_cm: f64,
    /// Closer than this the alert bypasses cooldown (default: 30cm)
    pub critical_distance_cm: f64,
    /// Labels worth announcing at all
    pub priority_objects: Vec<String>,
    /// Labels also announced when off to the side
    pub side_objects: Vec<String>,
    /// Left edge of the "ahead" region as a fraction of frame width
    pub center_start: f32,
    /// Right edge of the "ahead" region as a fraction of frame width
    pub center_end: f32,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 5.0,
            confidence_threshold: 0.5,
            trigger_distance_cm: 100.0,
            announce_distance_cm: 60.0,
            critical_distance_cm: 30.0,
            priority_objects: [
                "person",
                "chair",
                "car",
                "bicycle",
                "motorbike",
                "bus",
                "train",
                "bottle",
                "diningtable",
                "pottedplant",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            side_objects: vec!["person".to_string(), "car".to_string()],
            center_start: 0.3,
            center_end: 0.7,
        }
    }
}

impl AlertConfig {
    /// Cooldown as a duration; negative or non-finite values mean no cooldown
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cooldown_secs).unwrap_or(Duration::ZERO)
    }
}
