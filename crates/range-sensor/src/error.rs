//! Range Sensor Error Types

use gpio::GpioError;
use std::fmt;
use thiserror::Error;

/// Echo edge being waited on when a measurement timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Rising => write!(f, "rising"),
            Edge::Falling => write!(f, "falling"),
        }
    }
}

/// Errors that can occur during a single measurement
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// Echo edge never arrived within the timeout window
    #[error("Echo {edge} edge not seen after {waited_ms}ms")]
    Timeout { edge: Edge, waited_ms: u64 },

    /// Computed distance outside the sensor's rated range
    #[error("Distance {0:.2}cm outside sensor range")]
    OutOfRange(f64),

    /// Pin access failed
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
}

impl SensorError {
    /// Whether this failure means the sensor is not answering at all
    pub fn is_timeout(&self) -> bool {
        matches!(self, SensorError::Timeout { .. })
    }
}
