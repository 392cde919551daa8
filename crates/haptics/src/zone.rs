//! Distance zones

use crate::command::HapticCommand;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named distance band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Critical,
    Danger,
    Warning,
    Caution,
    Clear,
    /// No valid reading this cycle; not part of the zone table
    NoReading,
}

impl Zone {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Critical => "critical",
            Zone::Danger => "danger",
            Zone::Warning => "warning",
            Zone::Caution => "caution",
            Zone::Clear => "clear",
            Zone::NoReading => "no_reading",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the zone table, covering `[min_cm, max_cm)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneBand {
    pub zone: Zone,
    pub min_cm: f64,
    pub max_cm: f64,
    /// Intensity at `min_cm`
    pub intensity_near: f64,
    /// Intensity approached as distance reaches `max_cm`
    pub intensity_far: f64,
    pub pulse_rate_hz: u8,
}

impl ZoneBand {
    /// Lower bound inclusive, upper bound exclusive
    pub fn contains(&self, distance_cm: f64) -> bool {
        distance_cm >= self.min_cm && distance_cm < self.max_cm
    }

    fn intensity_at(&self, distance_cm: f64) -> u8 {
        let value = if self.max_cm.is_finite() {
            let span = self.max_cm - self.min_cm;
            let fraction = (distance_cm - self.min_cm) / span;
            self.intensity_near + (self.intensity_far - self.intensity_near) * fraction
        } else {
            self.intensity_near
        };
        value.round().clamp(0.0, 100.0) as u8
    }
}

/// Zone table, ordered nearest first; contiguous over `[0, ∞)`
pub const ZONE_TABLE: [ZoneBand; 5] = [
    ZoneBand {
        zone: Zone::Critical,
        min_cm: 0.0,
        max_cm: 30.0,
        intensity_near: 100.0,
        intensity_far: 100.0,
        pulse_rate_hz: 0,
    },
    ZoneBand {
        zone: Zone::Danger,
        min_cm: 30.0,
        max_cm: 60.0,
        intensity_near: 100.0,
        intensity_far: 70.0,
        pulse_rate_hz: 5,
    },
    ZoneBand {
        zone: Zone::Warning,
        min_cm: 60.0,
        max_cm: 100.0,
        intensity_near: 70.0,
        intensity_far: 40.0,
        pulse_rate_hz: 2,
    },
    ZoneBand {
        zone: Zone::Caution,
        min_cm: 100.0,
        max_cm: 150.0,
        intensity_near: 40.0,
        intensity_far: 20.0,
        pulse_rate_hz: 1,
    },
    ZoneBand {
        zone: Zone::Clear,
        min_cm: 150.0,
        max_cm: f64::INFINITY,
        intensity_near: 0.0,
        intensity_far: 0.0,
        pulse_rate_hz: 0,
    },
];

/// Result of classifying one distance sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub intensity: u8,
    pub pulse_rate_hz: u8,
    pub zone: Zone,
}

impl Classification {
    const NO_READING: Classification = Classification {
        intensity: 0,
        pulse_rate_hz: 0,
        zone: Zone::NoReading,
    };

    /// Motor command for this classification
    pub fn command(&self) -> HapticCommand {
        HapticCommand::new(self.intensity, self.pulse_rate_hz)
    }
}

/// Map a distance sample to intensity, pulse rate and zone
pub fn classify(distance_cm: Option<f64>) -> Classification {
    let Some(distance) = distance_cm.filter(|d| d.is_finite()) else {
        return Classification::NO_READING;
    };
    let distance = distance.max(0.0);

    let band = ZONE_TABLE
        .iter()
        .find(|band| band.contains(distance))
        .unwrap_or(&ZONE_TABLE[ZONE_TABLE.len() - 1]);

    Classification {
        intensity: band.intensity_at(distance),
        pulse_rate_hz: band.pulse_rate_hz,
        zone: band.zone,
    }
}
