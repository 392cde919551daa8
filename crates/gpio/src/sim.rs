//! Simulated pins
//!
//! `SimulatedRanger` behaves like an HC-SR04: a falling edge on the trigger
//! line schedules an echo pulse whose width matches the configured distance.
//! `RecordingPwm` keeps the most recent duty-cycle writes so tests can
//! inspect the output pattern; the log is capped so long runs stay bounded.

use crate::{DigitalInput, DigitalOutput, GpioError, PwmOutput};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Round-trip seconds to centimeters (343 m/s halved)
const CM_PER_SECOND: f64 = 17150.0;

/// Delay between trigger falling edge and echo rising edge on a real HC-SR04
const ECHO_LATENCY: Duration = Duration::from_micros(200);

/// Writes kept by a [`RecordingPwm`] unless told otherwise
pub const DEFAULT_PWM_HISTORY: usize = 4096;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct EchoState {
    /// Distance to report; `None` means no echo ever returns
    distance_cm: Option<f64>,
    trigger_high: bool,
    fired_at: Option<Instant>,
    trigger_pin: u8,
    echo_pin: u8,
    fail_reads: bool,
}

/// Simulated HC-SR04 ultrasonic sensor
#[derive(Debug, Clone)]
pub struct SimulatedRanger {
    state: Arc<Mutex<EchoState>>,
}

impl SimulatedRanger {
    /// Create a simulated sensor facing an obstacle at `distance_cm`
    pub fn new(distance_cm: Option<f64>) -> Self {
        Self {
            state: Arc::new(Mutex::new(EchoState {
                distance_cm,
                trigger_high: false,
                fired_at: None,
                trigger_pin: 23,
                echo_pin: 24,
                fail_reads: false,
            })),
        }
    }

    /// Trigger and echo pins wired to this sensor
    pub fn pins(&self) -> (SimTrigger, SimEcho) {
        (
            SimTrigger {
                state: Arc::clone(&self.state),
            },
            SimEcho {
                state: Arc::clone(&self.state),
            },
        )
    }

    /// Move the simulated obstacle
    pub fn set_distance(&self, distance_cm: Option<f64>) {
        lock(&self.state).distance_cm = distance_cm;
    }

    /// Make echo reads fail, as a disconnected wire would
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).fail_reads = failing;
    }
}

/// Trigger side of a [`SimulatedRanger`]
#[derive(Debug)]
pub struct SimTrigger {
    state: Arc<Mutex<EchoState>>,
}

impl DigitalOutput for SimTrigger {
    fn set_level(&mut self, high: bool) -> Result<(), GpioError> {
        let mut state = lock(&self.state);
        if high {
            state.trigger_high = true;
        } else if state.trigger_high {
            state.trigger_high = false;
            state.fired_at = Some(Instant::now());
        }
        Ok(())
    }
}

/// Echo side of a [`SimulatedRanger`]
#[derive(Debug)]
pub struct SimEcho {
    state: Arc<Mutex<EchoState>>,
}

impl DigitalInput for SimEcho {
    fn is_high(&mut self) -> Result<bool, GpioError> {
        let state = lock(&self.state);
        if state.fail_reads {
            return Err(GpioError::Read {
                pin: state.echo_pin,
                reason: "simulated wiring fault".to_string(),
            });
        }

        let (Some(fired_at), Some(distance)) = (state.fired_at, state.distance_cm) else {
            return Ok(false);
        };

        let start = fired_at + ECHO_LATENCY;
        let width = Duration::from_secs_f64(distance.max(0.0) / CM_PER_SECOND);
        let now = Instant::now();
        Ok(now >= start && now < start + width)
    }
}

impl Drop for SimTrigger {
    fn drop(&mut self) {
        let state = lock(&self.state);
        debug!("Released simulated trigger pin {}", state.trigger_pin);
    }
}

#[derive(Debug)]
struct PwmLog {
    duty: u8,
    /// Oldest entries are dropped once `capacity` is reached
    writes: VecDeque<(Instant, u8)>,
    capacity: usize,
    failing: bool,
}

/// PWM pin that records recent duty-cycle writes
#[derive(Debug, Clone)]
pub struct RecordingPwm {
    log: Arc<Mutex<PwmLog>>,
    pin: u8,
}

impl RecordingPwm {
    /// Create a recording pin bound to `pin`
    pub fn new(pin: u8) -> Self {
        Self::with_history(pin, DEFAULT_PWM_HISTORY)
    }

    /// Create a recording pin that keeps at most `capacity` writes
    pub fn with_history(pin: u8, capacity: usize) -> Self {
        Self {
            log: Arc::new(Mutex::new(PwmLog {
                duty: 0,
                writes: VecDeque::new(),
                capacity,
                failing: false,
            })),
            pin,
        }
    }

    /// Current duty cycle
    pub fn duty_cycle(&self) -> u8 {
        lock(&self.log).duty
    }

    /// Duty values written at or after `since`
    pub fn writes_since(&self, since: Instant) -> Vec<u8> {
        lock(&self.log)
            .writes
            .iter()
            .filter(|(at, _)| *at >= since)
            .map(|(_, duty)| *duty)
            .collect()
    }

    /// Number of writes still held in the log
    pub fn write_count(&self) -> usize {
        lock(&self.log).writes.len()
    }

    /// Make subsequent writes fail
    pub fn set_failing(&self, failing: bool) {
        lock(&self.log).failing = failing;
    }
}

impl PwmOutput for RecordingPwm {
    fn set_duty_cycle(&mut self, percent: u8) -> Result<(), GpioError> {
        if percent > 100 {
            return Err(GpioError::DutyCycle(percent));
        }
        let mut log = lock(&self.log);
        if log.failing {
            return Err(GpioError::Write {
                pin: self.pin,
                reason: "simulated driver fault".to_string(),
            });
        }
        log.duty = percent;
        if log.capacity == 0 {
            return Ok(());
        }
        if log.writes.len() == log.capacity {
            log.writes.pop_front();
        }
        log.writes.push_back((Instant::now(), percent));
        Ok(())
    }
}
