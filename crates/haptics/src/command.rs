//! Motor commands

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the vibration motor should be doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HapticCommand {
    /// Motor off
    Off,
    /// Continuous drive at the given intensity (1-100)
    Constant(u8),
    /// On/off toggling at `rate_hz`, driving `intensity` during the on phase
    Pulsed { intensity: u8, rate_hz: u8 },
}

impl HapticCommand {
    /// Build a command from raw zone output.
    ///
    /// Zero intensity means off regardless of rate; zero rate means constant drive.
    pub fn new(intensity: u8, pulse_rate_hz: u8) -> Self {
        let intensity = intensity.min(100);
        match (intensity, pulse_rate_hz) {
            (0, _) => HapticCommand::Off,
            (i, 0) => HapticCommand::Constant(i),
            (i, r) => HapticCommand::Pulsed {
                intensity: i,
                rate_hz: r,
            },
        }
    }

    /// Peak duty cycle this command produces
    pub fn intensity(&self) -> u8 {
        match *self {
            HapticCommand::Off => 0,
            HapticCommand::Constant(i) => i,
            HapticCommand::Pulsed { intensity, .. } => intensity,
        }
    }

    /// Length of each on and each off phase, for pulsed commands
    pub fn half_period(&self) -> Option<Duration> {
        match *self {
            HapticCommand::Pulsed { rate_hz, .. } if rate_hz > 0 => {
                Some(Duration::from_secs_f64(1.0 / (2.0 * f64::from(rate_hz))))
            }
            _ => None,
        }
    }
}
