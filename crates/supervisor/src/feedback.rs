//! Feedback Loop
//!
//! Sensor → zone → motor at a fixed period on a dedicated thread. The
//! sensor busy-waits on the echo line, so this loop never runs on the async
//! runtime.

use crate::config::FeedbackConfig;
use crate::error::{LoopError, SupervisorError};
use crate::health::{ComponentHealth, LoopState};
use crate::lock;
use crate::shared::SharedDistance;
use gpio::PwmOutput;
use haptics::{classify, Classification, HapticActuator, Zone};
use range_sensor::{DistanceSensor, SensorError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Motor shared between the feedback loop and the supervisor's shutdown path
pub type SharedActuator = Arc<Mutex<HapticActuator<Box<dyn PwmOutput>>>>;

/// Loop name used in logs and metrics
pub const FEEDBACK_LOOP: &str = "feedback";

/// The fast control loop
pub struct FeedbackLoop {
    sensor: Box<dyn DistanceSensor>,
    actuator: SharedActuator,
    shared: SharedDistance,
    health: Arc<ComponentHealth>,
    config: FeedbackConfig,
    last_zone: Option<Zone>,
}

impl FeedbackLoop {
    pub fn new(
        sensor: Box<dyn DistanceSensor>,
        actuator: SharedActuator,
        shared: SharedDistance,
        health: Arc<ComponentHealth>,
        config: FeedbackConfig,
    ) -> Self {
        Self {
            sensor,
            actuator,
            shared,
            health,
            config,
            last_zone: None,
        }
    }

    /// One iteration: measure, publish, classify, drive the motor.
    ///
    /// An out-of-range echo is open space, not a fault. A sensor or motor
    /// fault leaves the motor off.
    pub fn step(&mut self) -> Result<Classification, LoopError> {
        let sample = match self.sensor.read() {
            Ok(distance) => Some(distance),
            Err(SensorError::OutOfRange(distance)) => {
                debug!("Echo out of range ({:.1}cm), treating as open space", distance);
                None
            }
            Err(e) => {
                self.shared.publish(None);
                lock(&self.actuator).off();
                return Err(e.into());
            }
        };

        self.shared.publish(sample);
        if let Some(distance) = sample {
            metrics::gauge!("cane_distance_cm").set(distance);
        }

        let classification = classify(sample);
        if self.last_zone != Some(classification.zone) {
            debug!(
                "Zone {} (distance {:?}, intensity {}%, {} Hz)",
                classification.zone,
                sample,
                classification.intensity,
                classification.pulse_rate_hz
            );
            self.last_zone = Some(classification.zone);
        }

        let mut actuator = lock(&self.actuator);
        if let Err(e) = actuator.apply(classification.command()) {
            actuator.off();
            return Err(e.into());
        }

        Ok(classification)
    }

    /// Run until `shutdown` flips to true or the error ceiling is reached.
    ///
    /// The motor is off whenever this returns.
    pub fn run(mut self, shutdown: watch::Receiver<bool>) -> Result<(), SupervisorError> {
        let period = self.config.period();
        let max_errors = self.config.max_errors;
        info!(
            "Feedback loop starting (period {:?}, max {} errors)",
            period, max_errors
        );

        if self.config.startup_buzz_ms > 0 {
            let cue = Duration::from_millis(self.config.startup_buzz_ms);
            if let Err(e) = lock(&self.actuator).buzz(cue) {
                warn!("Startup cue failed: {}", e);
            }
        }

        self.health.set_state(LoopState::Running);
        let mut next = Instant::now();

        while !*shutdown.borrow() {
            match self.step() {
                Ok(_) => self.health.record_success(),
                Err(e) => {
                    let errors = self.health.record_error();
                    warn!(
                        "Feedback iteration failed ({}/{}): {}",
                        errors, max_errors, e
                    );
                    if errors >= max_errors {
                        error!(
                            "Feedback loop giving up after {} consecutive errors, motor off",
                            errors
                        );
                        lock(&self.actuator).off();
                        self.shared.publish(None);
                        self.health.set_state(LoopState::Exhausted);
                        return Err(SupervisorError::Exhausted {
                            loop_name: FEEDBACK_LOOP,
                            errors,
                        });
                    }
                    thread::sleep(self.config.backoff());
                    next = Instant::now();
                    continue;
                }
            }

            next += period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                // Overran the period; don't try to catch up
                next = now;
            }
        }

        lock(&self.actuator).off();
        self.health.set_state(LoopState::Stopped);
        info!("Feedback loop stopped");
        Ok(())
    }
}
