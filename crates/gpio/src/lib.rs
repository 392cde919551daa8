//! GPIO Contracts for the Smart Cane
//!
//! Minimal pin-level traits the feedback engine drives:
//! - Digital output (ultrasonic trigger line)
//! - Digital input (ultrasonic echo line)
//! - PWM output (vibration motor duty cycle)
//!
//! Board-specific backends implement these traits. The [`sim`] module
//! provides an HC-SR04 simulation and a recording PWM pin for bench runs.

pub mod sim;

use thiserror::Error;

/// GPIO error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpioError {
    #[error("Failed to write pin {pin}: {reason}")]
    Write { pin: u8, reason: String },

    #[error("Failed to read pin {pin}: {reason}")]
    Read { pin: u8, reason: String },

    #[error("Invalid duty cycle {0}% (expected 0-100)")]
    DutyCycle(u8),

    #[error("Pin {0} already released")]
    Released(u8),
}

/// A push-pull digital output line
pub trait DigitalOutput: Send {
    /// Drive the line high (`true`) or low (`false`)
    fn set_level(&mut self, high: bool) -> Result<(), GpioError>;
}

/// A digital input line
pub trait DigitalInput: Send {
    /// Sample the current line level
    fn is_high(&mut self) -> Result<bool, GpioError>;
}

/// A PWM-capable output pin
pub trait PwmOutput: Send {
    /// Set duty cycle as a percentage (0 = off, 100 = fully on)
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), GpioError>;
}

impl<T: DigitalOutput + ?Sized> DigitalOutput for Box<T> {
    fn set_level(&mut self, high: bool) -> Result<(), GpioError> {
        (**self).set_level(high)
    }
}

impl<T: DigitalInput + ?Sized> DigitalInput for Box<T> {
    fn is_high(&mut self) -> Result<bool, GpioError> {
        (**self).is_high()
    }
}

impl<T: PwmOutput + ?Sized> PwmOutput for Box<T> {
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), GpioError> {
        (**self).set_duty_cycle(percent)
    }
}
