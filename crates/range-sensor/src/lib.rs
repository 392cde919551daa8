//! Ultrasonic Range Sensor
//!
//! Pulse-timing distance measurement for HC-SR04 style sensors. A single
//! measurement fires a 10 µs trigger pulse, busy-polls the echo line for
//! both edges and converts the echo width to centimeters.
//!
//! Every failure collapses to `None` through [`DistanceSensor::measure`];
//! callers that need to tell a timeout from an out-of-range echo use
//! [`DistanceSensor::read`].

mod error;
mod sensor;

pub use error::{Edge, SensorError};
pub use sensor::{RangeSensor, SensorConfig};

use tracing::debug;

/// One distance reading in centimeters; `None` when no valid echo arrived
pub type DistanceSample = Option<f64>;

/// Closest distance the sensor can resolve (cm)
pub const MIN_DISTANCE_CM: f64 = 2.0;

/// Farthest distance the sensor can resolve (cm)
pub const MAX_DISTANCE_CM: f64 = 400.0;

/// Converts echo width in seconds to one-way distance in centimeters
pub const CM_PER_SECOND: f64 = 17150.0;

/// A source of distance readings
pub trait DistanceSensor: Send {
    /// Take one measurement, reporting why it failed
    fn read(&mut self) -> Result<f64, SensorError>;

    /// Take one measurement; all failures become `None`
    fn measure(&mut self) -> DistanceSample {
        match self.read() {
            Ok(distance) => Some(distance),
            Err(e) => {
                debug!("No distance this cycle: {}", e);
                None
            }
        }
    }
}

impl<T: DistanceSensor + ?Sized> DistanceSensor for Box<T> {
    fn read(&mut self) -> Result<f64, SensorError> {
        (**self).read()
    }
}

/// Validate a raw distance against the sensor's physical range
pub fn validate_distance(distance_cm: f64) -> Result<f64, SensorError> {
    if (MIN_DISTANCE_CM..=MAX_DISTANCE_CM).contains(&distance_cm) {
        Ok(distance_cm)
    } else {
        Err(SensorError::OutOfRange(distance_cm))
    }
}
