//! Haptic Feedback
//!
//! Maps obstacle distance onto vibration:
//! - Zone table with linear intensity falloff inside each band
//! - Tagged motor commands (off, constant, pulsed)
//! - PWM actuator with a cancellable pulse sub-loop

mod actuator;
mod command;
mod zone;

pub use actuator::HapticActuator;
pub use command::HapticCommand;
pub use zone::{classify, Classification, Zone, ZoneBand, ZONE_TABLE};

use gpio::GpioError;
use thiserror::Error;

/// Actuator error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("PWM write failed: {0}")]
    Pwm(#[from] GpioError),

    #[error("Pulse sub-loop stopped after a PWM fault: {0}")]
    PulseFault(GpioError),

    #[error("Intensity {0} outside 0-100")]
    Intensity(u8),

    #[error("Failed to start pulse sub-loop: {0}")]
    Spawn(String),
}
