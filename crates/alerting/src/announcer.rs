//! Obstacle announcements
//!
//! Turns a detection list plus the current distance into at most one spoken
//! alert per cycle, and keeps the set of visible objects so cooldowns reset
//! once an object leaves view.

use crate::collaborator::Detection;
use crate::config::AlertConfig;
use crate::gate::AlertGate;
use std::collections::HashSet;
use tracing::debug;

/// Phrase family of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// Inside the critical distance; always spoken
    VeryClose,
    /// Center object inside the announce distance
    Ahead,
    /// Newly visible object further out
    Detected,
}

impl AlertKind {
    pub const ALL: [AlertKind; 3] = [AlertKind::VeryClose, AlertKind::Ahead, AlertKind::Detected];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::VeryClose => "very_close",
            AlertKind::Ahead => "ahead",
            AlertKind::Detected => "detected",
        }
    }
}

/// A spoken alert ready for the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Cooldown key, `<label>:<kind>`
    pub key: String,
    /// Text handed to speech
    pub text: String,
    /// Bypass cooldown and overlap suppression
    pub force: bool,
    pub kind: AlertKind,
}

impl Alert {
    fn new(label: &str, kind: AlertKind) -> Self {
        let name = spoken_name(label);
        let text = match kind {
            AlertKind::VeryClose => format!("Stop! {} very close", name),
            AlertKind::Ahead => format!("{} ahead", name),
            AlertKind::Detected => format!("{} detected", name),
        };
        Self {
            key: alert_key(label, kind),
            text,
            force: kind == AlertKind::VeryClose,
            kind,
        }
    }
}

/// Cooldown key for a label and phrase family
pub fn alert_key(label: &str, kind: AlertKind) -> String {
    format!("{}:{}", label, kind.as_str())
}

/// Name to speak for a detector class label
fn spoken_name(label: &str) -> &str {
    match label {
        "diningtable" => "table",
        "pottedplant" => "plant",
        "tvmonitor" => "screen",
        "motorbike" => "motorbike",
        other => other,
    }
}

/// Picks what to announce
pub struct Announcer {
    config: AlertConfig,
    /// Labels seen in the previous assessed frame
    visible: HashSet<String>,
}

impl Announcer {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            visible: HashSet::new(),
        }
    }

    /// Detections worth tracking: confident, on the priority list, and either
    /// ahead or one of the configured side objects
    pub fn relevant<'a>(&self, detections: &'a [Detection]) -> Vec<&'a Detection> {
        detections
            .iter()
            .filter(|d| d.confidence >= self.config.confidence_threshold)
            .filter(|d| self.config.priority_objects.iter().any(|p| *p == d.label))
            .filter(|d| d.in_center || self.config.side_objects.iter().any(|s| *s == d.label))
            .collect()
    }

    /// Update visible objects and choose at most one alert.
    ///
    /// Objects that left view get every cooldown key reset on `gate`.
    pub fn assess(
        &mut self,
        detections: &[Detection],
        distance_cm: f64,
        gate: &mut AlertGate,
    ) -> Option<Alert> {
        let relevant = self.relevant(detections);
        let now_visible: HashSet<String> = relevant.iter().map(|d| d.label.clone()).collect();

        for gone in self.visible.difference(&now_visible) {
            debug!("Object left view: {}", gone);
            for kind in AlertKind::ALL {
                gate.reset(&alert_key(gone, kind));
            }
        }

        let newly_visible: Vec<&Detection> = relevant
            .iter()
            .copied()
            .filter(|d| !self.visible.contains(&d.label))
            .collect();
        self.visible = now_visible;

        let nearest_ahead = relevant
            .iter()
            .filter(|d| d.in_center)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        if let Some(object) = nearest_ahead {
            if distance_cm < self.config.critical_distance_cm {
                return Some(Alert::new(&object.label, AlertKind::VeryClose));
            }
            if distance_cm < self.config.announce_distance_cm {
                return Some(Alert::new(&object.label, AlertKind::Ahead));
            }
        }

        newly_visible
            .into_iter()
            .max_by(|a, b| {
                a.in_center
                    .cmp(&b.in_center)
                    .then(a.confidence.total_cmp(&b.confidence))
            })
            .map(|d| {
                let kind = if d.in_center {
                    AlertKind::Ahead
                } else {
                    AlertKind::Detected
                };
                Alert::new(&d.label, kind)
            })
    }

    /// Treat every tracked object as gone, e.g. once the path ahead clears.
    /// Their cooldown keys are reset on `gate`.
    pub fn forget_all(&mut self, gate: &mut AlertGate) {
        for gone in self.visible.drain() {
            debug!("Object no longer tracked: {}", gone);
            for kind in AlertKind::ALL {
                gate.reset(&alert_key(&gone, kind));
            }
        }
    }

    /// Labels currently considered visible
    pub fn visible(&self) -> impl Iterator<Item = &str> {
        self.visible.iter().map(String::as_str)
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn setup() -> (Announcer, AlertGate) {
        (
            Announcer::new(AlertConfig::default()),
            AlertGate::new(Duration::from_secs(5)),
        )
    }

    #[test]
    fn test_filters_low_confidence_and_unlisted() {
        let (announcer, _) = setup();
        let detections = vec![
            Detection::new("person", 0.3, true),
            Detection::new("sheep", 0.9, true),
            Detection::new("chair", 0.8, false),
            Detection::new("car", 0.8, false),
            Detection::new("bottle", 0.6, true),
        ];
        let labels: Vec<_> = announcer
            .relevant(&detections)
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        assert_eq!(labels, vec!["car", "bottle"]);
    }

    #[test]
    fn test_critical_alert_is_forced() {
        let (mut announcer, mut gate) = setup();
        let detections = vec![
            Detection::new("chair", 0.6, true),
            Detection::new("person", 0.9, true),
        ];
        let alert = announcer.assess(&detections, 20.0, &mut gate).unwrap();
        assert_eq!(alert.key, "person:very_close");
        assert_eq!(alert.text, "Stop! person very close");
        assert!(alert.force);
    }

    #[test]
    fn test_danger_alert_uses_cooldown() {
        let (mut announcer, mut gate) = setup();
        let detections = vec![Detection::new("diningtable", 0.7, true)];
        let alert = announcer.assess(&detections, 45.0, &mut gate).unwrap();
        assert_eq!(alert.key, "diningtable:ahead");
        assert_eq!(alert.text, "table ahead");
        assert!(!alert.force);
    }

    #[test]
    fn test_new_object_announced_further_out() {
        let (mut announcer, mut gate) = setup();
        let side = vec![Detection::new("car", 0.8, false)];

        let alert = announcer.assess(&side, 90.0, &mut gate).unwrap();
        assert_eq!(alert.text, "car detected");

        // Still visible, not close: nothing new to say
        assert!(announcer.assess(&side, 90.0, &mut gate).is_none());
    }

    #[test]
    fn test_side_object_never_ahead() {
        let (mut announcer, mut gate) = setup();
        let side = vec![Detection::new("person", 0.9, false)];
        announcer.assess(&side, 90.0, &mut gate);
        assert!(announcer.assess(&side, 10.0, &mut gate).is_none());
    }

    #[test]
    fn test_object_leaving_view_resets_cooldown() {
        let (mut announcer, mut gate) = setup();
        let now = Instant::now();
        let person = vec![Detection::new("person", 0.9, true)];

        let alert = announcer.assess(&person, 50.0, &mut gate).unwrap();
        assert!(gate.try_fire(&alert.key, now, alert.force));
        assert!(!gate.try_fire(&alert.key, now, false));

        announcer.assess(&[], 50.0, &mut gate);
        assert!(gate.state("person:ahead").is_none());
        assert_eq!(announcer.visible().count(), 0);

        let again = announcer.assess(&person, 50.0, &mut gate).unwrap();
        assert!(gate.try_fire(&again.key, now, again.force));
    }

    #[test]
    fn test_forget_all_allows_reannouncement() {
        let (mut announcer, mut gate) = setup();
        let now = Instant::now();
        let person = vec![Detection::new("person", 0.9, true)];

        let alert = announcer.assess(&person, 80.0, &mut gate).unwrap();
        assert!(gate.try_fire(&alert.key, now, alert.force));
        assert!(announcer.assess(&person, 80.0, &mut gate).is_none());

        announcer.forget_all(&mut gate);
        assert_eq!(announcer.visible().count(), 0);
        assert!(gate.state("person:ahead").is_none());

        let again = announcer.assess(&person, 80.0, &mut gate).unwrap();
        assert_eq!(again.key, "person:ahead");
        assert!(gate.try_fire(&again.key, now, again.force));
    }

    #[test]
    fn test_no_alert_when_nothing_relevant() {
        let (mut announcer, mut gate) = setup();
        assert!(announcer.assess(&[], 10.0, &mut gate).is_none());
    }
}
