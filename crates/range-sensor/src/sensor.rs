//! HC-SR04 Measurement

use crate::error::{Edge, SensorError};
use crate::{validate_distance, DistanceSensor, CM_PER_SECOND};
use gpio::{DigitalInput, DigitalOutput};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Sensor timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Bound on each echo edge wait (default: 100ms)
    pub timeout_ms: u64,
    /// Trigger pulse width (default: 10µs)
    pub trigger_pulse_us: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 100,
            trigger_pulse_us: 10,
        }
    }
}

/// Ultrasonic sensor on a trigger/echo pin pair
pub struct RangeSensor<T: DigitalOutput, E: DigitalInput> {
    trigger: T,
    echo: E,
    timeout: Duration,
    trigger_pulse: Duration,
}

impl<T: DigitalOutput, E: DigitalInput> RangeSensor<T, E> {
    /// Create a sensor and park the trigger line low
    pub fn new(mut trigger: T, echo: E, config: &SensorConfig) -> Result<Self, SensorError> {
        trigger.set_level(false)?;
        info!(
            "Range sensor ready (timeout {}ms, trigger {}µs)",
            config.timeout_ms, config.trigger_pulse_us
        );
        Ok(Self {
            trigger,
            echo,
            timeout: Duration::from_millis(config.timeout_ms),
            trigger_pulse: Duration::from_micros(config.trigger_pulse_us),
        })
    }

    /// Echo wait bound
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn fire_trigger(&mut self) -> Result<(), SensorError> {
        self.trigger.set_level(true)?;
        // thread::sleep overshoots by far more than 10µs, spin instead
        let start = Instant::now();
        while start.elapsed() < self.trigger_pulse {
            std::hint::spin_loop();
        }
        self.trigger.set_level(false)?;
        Ok(())
    }

    /// Busy-poll until the echo line reads `level`, returning when it did
    fn wait_for_level(&mut self, level: bool, edge: Edge) -> Result<Instant, SensorError> {
        let entered = Instant::now();
        loop {
            let high = self.echo.is_high()?;
            let now = Instant::now();
            if high == level {
                return Ok(now);
            }
            if now.duration_since(entered) > self.timeout {
                return Err(SensorError::Timeout {
                    edge,
                    waited_ms: self.timeout.as_millis() as u64,
                });
            }
            std::hint::spin_loop();
        }
    }
}

impl<T: DigitalOutput, E: DigitalInput> DistanceSensor for RangeSensor<T, E> {
    fn read(&mut self) -> Result<f64, SensorError> {
        self.fire_trigger()?;

        let t_start = self.wait_for_level(true, Edge::Rising)?;
        let t_end = self.wait_for_level(false, Edge::Falling)?;

        let distance = t_end.duration_since(t_start).as_secs_f64() * CM_PER_SECOND;
        let distance = (distance * 100.0).round() / 100.0;
        debug!("Echo width {:?} -> {:.2}cm", t_end - t_start, distance);

        validate_distance(distance)
    }
}

impl<T: DigitalOutput, E: DigitalInput> Drop for RangeSensor<T, E> {
    fn drop(&mut self) {
        if let Err(e) = self.trigger.set_level(false) {
            warn!("Failed to park trigger line on release: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpio::sim::SimulatedRanger;
    use gpio::GpioError;

    fn sensor_for(ranger: &SimulatedRanger, timeout_ms: u64) -> RangeSensor<gpio::sim::SimTrigger, gpio::sim::SimEcho> {
        let (trigger, echo) = ranger.pins();
        let config = SensorConfig {
            timeout_ms,
            ..Default::default()
        };
        RangeSensor::new(trigger, echo, &config).unwrap()
    }

    #[test]
    fn test_measures_simulated_obstacle() {
        let ranger = SimulatedRanger::new(Some(100.0));
        let mut sensor = sensor_for(&ranger, 100);

        let distance = sensor.measure().expect("echo should arrive");
        assert!((distance - 100.0).abs() < 5.0, "measured {}", distance);
    }

    #[test]
    fn test_no_echo_times_out_within_bound() {
        let ranger = SimulatedRanger::new(None);
        let mut sensor = sensor_for(&ranger, 20);

        let start = Instant::now();
        let result = sensor.read();
        assert_eq!(
            result,
            Err(SensorError::Timeout {
                edge: Edge::Rising,
                waited_ms: 20
            })
        );
        assert!(start.elapsed() < Duration::from_millis(200));
        assert_eq!(sensor.measure(), None);
    }

    #[test]
    fn test_far_echo_rejected() {
        // 500cm echo is ~29ms wide, inside the timeout but beyond the rated range
        let ranger = SimulatedRanger::new(Some(500.0));
        let mut sensor = sensor_for(&ranger, 100);

        assert!(matches!(sensor.read(), Err(SensorError::OutOfRange(_))));
    }

    #[test]
    fn test_gpio_fault_surfaces_in_read() {
        let ranger = SimulatedRanger::new(Some(50.0));
        ranger.set_failing(true);
        let mut sensor = sensor_for(&ranger, 100);

        assert!(matches!(
            sensor.read(),
            Err(SensorError::Gpio(GpioError::Read { .. }))
        ));
        assert_eq!(sensor.measure(), None);
    }
}
