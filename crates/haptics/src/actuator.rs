//! Vibration motor actuator
//!
//! Owns the PWM pin. Pulsed commands run on a dedicated sub-loop thread that
//! toggles the output; every other command first cancels that thread and
//! joins it, so at most one driver ever writes the pin.

use crate::command::HapticCommand;
use crate::ActuatorError;
use gpio::{GpioError, PwmOutput};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

fn lock<T: ?Sized>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Running pulse sub-loop
struct PulseWorker {
    command: HapticCommand,
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// PWM vibration motor with pulse support
pub struct HapticActuator<P: PwmOutput + 'static> {
    pwm: Arc<Mutex<P>>,
    /// Last command fully applied; `None` after a failed write
    current: Option<HapticCommand>,
    pulse: Option<PulseWorker>,
    /// Fault latched by the pulse sub-loop
    fault: Arc<Mutex<Option<GpioError>>>,
}

impl<P: PwmOutput + 'static> HapticActuator<P> {
    /// Take ownership of the motor pin and drive it off
    pub fn new(mut pwm: P) -> Result<Self, ActuatorError> {
        pwm.set_duty_cycle(0)?;
        info!("Haptic actuator initialized");
        Ok(Self {
            pwm: Arc::new(Mutex::new(pwm)),
            current: Some(HapticCommand::Off),
            pulse: None,
            fault: Arc::new(Mutex::new(None)),
        })
    }

    /// Apply a motor command.
    ///
    /// Re-applying the running command is a no-op; anything else cancels the
    /// pulse sub-loop and waits for it to exit before touching the pin.
    pub fn apply(&mut self, command: HapticCommand) -> Result<(), ActuatorError> {
        let latched = lock(&self.fault).take();
        if let Some(fault) = latched {
            warn!("Pulse sub-loop faulted: {}", fault);
            self.stop_pulse();
            self.current = None;
            if let Err(e) = self.drive(0) {
                error!("Failed to silence motor after pulse fault: {}", e);
            }
            return Err(ActuatorError::PulseFault(fault));
        }

        if self.current == Some(command) {
            return Ok(());
        }

        self.stop_pulse();
        self.current = None;

        match command {
            HapticCommand::Off => self.drive(0)?,
            HapticCommand::Constant(intensity) => {
                if intensity > 100 {
                    return Err(ActuatorError::Intensity(intensity));
                }
                self.drive(intensity)?
            }
            HapticCommand::Pulsed { intensity, .. } => {
                if intensity > 100 {
                    return Err(ActuatorError::Intensity(intensity));
                }
                self.start_pulse(command)?
            }
        }

        debug!("Haptic command applied: {:?}", command);
        self.current = Some(command);
        Ok(())
    }

    /// Stop all output. Idempotent and infallible.
    pub fn off(&mut self) {
        self.stop_pulse();
        match self.drive(0) {
            Ok(()) => self.current = Some(HapticCommand::Off),
            Err(e) => {
                error!("Failed to drive motor off: {}", e);
                self.current = None;
            }
        }
    }

    /// Short full-intensity pulse, used as a confirmation cue
    pub fn buzz(&mut self, duration: Duration) -> Result<(), ActuatorError> {
        self.stop_pulse();
        self.current = None;
        self.drive(100)?;
        thread::sleep(duration);
        self.drive(0)?;
        self.current = Some(HapticCommand::Off);
        Ok(())
    }

    /// Last successfully applied command
    pub fn current_command(&self) -> Option<HapticCommand> {
        self.current
    }

    /// Whether a pulse sub-loop is alive
    pub fn is_pulsing(&self) -> bool {
        self.pulse
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    fn drive(&self, duty: u8) -> Result<(), ActuatorError> {
        lock(&self.pwm).set_duty_cycle(duty)?;
        Ok(())
    }

    fn start_pulse(&mut self, command: HapticCommand) -> Result<(), ActuatorError> {
        let Some(half_period) = command.half_period() else {
            return self.drive(command.intensity());
        };
        let intensity = command.intensity();
        let active = Arc::new(AtomicBool::new(true));

        let pwm = Arc::clone(&self.pwm);
        let fault = Arc::clone(&self.fault);
        let flag = Arc::clone(&active);
        let handle = thread::Builder::new()
            .name("haptic-pulse".to_string())
            .spawn(move || pulse_loop(&pwm, &flag, &fault, intensity, half_period))
            .map_err(|e| ActuatorError::Spawn(e.to_string()))?;

        self.pulse = Some(PulseWorker {
            command,
            active,
            handle,
        });
        Ok(())
    }

    fn stop_pulse(&mut self) {
        if let Some(worker) = self.pulse.take() {
            worker.active.store(false, Ordering::Release);
            worker.handle.thread().unpark();
            if worker.handle.join().is_err() {
                error!("Pulse sub-loop panicked while running {:?}", worker.command);
            }
        }
    }
}

impl<P: PwmOutput + 'static> Drop for HapticActuator<P> {
    fn drop(&mut self) {
        self.off();
    }
}

/// Sleep until `deadline` unless the worker gets cancelled first
fn park_until(deadline: Instant, active: &AtomicBool) {
    loop {
        if !active.load(Ordering::Acquire) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::park_timeout(deadline - now);
    }
}

fn pulse_loop<P: PwmOutput>(
    pwm: &Mutex<P>,
    active: &AtomicBool,
    fault: &Mutex<Option<GpioError>>,
    intensity: u8,
    half_period: Duration,
) {
    debug!("Pulse sub-loop started ({}% every {:?})", intensity, half_period);
    let mut phase_start = Instant::now();

    'pulse: while active.load(Ordering::Acquire) {
        for duty in [intensity, 0] {
            if let Err(e) = lock(pwm).set_duty_cycle(duty) {
                error!("Pulse write failed: {}", e);
                *lock(fault) = Some(e);
                break 'pulse;
            }
            phase_start += half_period;
            park_until(phase_start, active);
            if !active.load(Ordering::Acquire) {
                break 'pulse;
            }
        }
    }

    if let Err(e) = lock(pwm).set_duty_cycle(0) {
        warn!("Pulse sub-loop could not leave motor off: {}", e);
    }
    debug!("Pulse sub-loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpio::sim::RecordingPwm;

    fn actuator() -> (HapticActuator<RecordingPwm>, RecordingPwm) {
        let pwm = RecordingPwm::new(25);
        (HapticActuator::new(pwm.clone()).unwrap(), pwm)
    }

    #[test]
    fn test_constant_drive() {
        let (mut act, pwm) = actuator();
        act.apply(HapticCommand::Constant(80)).unwrap();
        assert_eq!(pwm.duty_cycle(), 80);
        assert!(!act.is_pulsing());
        assert_eq!(act.current_command(), Some(HapticCommand::Constant(80)));
    }

    #[test]
    fn test_pulse_alternates() {
        let (mut act, pwm) = actuator();
        let start = Instant::now();
        act.apply(HapticCommand::Pulsed {
            intensity: 60,
            rate_hz: 5,
        })
        .unwrap();
        thread::sleep(Duration::from_millis(350));
        assert!(act.is_pulsing());

        let writes = pwm.writes_since(start);
        assert!(writes.len() >= 3, "writes: {:?}", writes);
        assert_eq!(&writes[..3], &[60, 0, 60]);
    }

    #[test]
    fn test_second_command_replaces_first() {
        let (mut act, pwm) = actuator();
        act.apply(HapticCommand::Pulsed {
            intensity: 90,
            rate_hz: 5,
        })
        .unwrap();
        act.apply(HapticCommand::Pulsed {
            intensity: 40,
            rate_hz: 2,
        })
        .unwrap();
        let settled = Instant::now();
        thread::sleep(Duration::from_millis(600));

        let writes = pwm.writes_since(settled);
        assert!(writes.contains(&40));
        assert!(writes.iter().all(|d| *d == 40 || *d == 0), "writes: {:?}", writes);
    }

    #[test]
    fn test_off_cancels_pulse() {
        let (mut act, pwm) = actuator();
        act.apply(HapticCommand::Pulsed {
            intensity: 70,
            rate_hz: 5,
        })
        .unwrap();
        thread::sleep(Duration::from_millis(30));
        act.apply(HapticCommand::Off).unwrap();
        let stopped = Instant::now();
        thread::sleep(Duration::from_millis(300));

        assert!(pwm.writes_since(stopped).is_empty());
        assert_eq!(pwm.duty_cycle(), 0);
        assert!(!act.is_pulsing());
    }

    #[test]
    fn test_same_command_keeps_sub_loop() {
        let (mut act, pwm) = actuator();
        let cmd = HapticCommand::Pulsed {
            intensity: 30,
            rate_hz: 1,
        };
        act.apply(cmd).unwrap();
        thread::sleep(Duration::from_millis(20));
        act.apply(cmd).unwrap();
        let reapplied = Instant::now();
        thread::sleep(Duration::from_millis(100));

        // A restart would have written the on phase immediately
        assert!(pwm.writes_since(reapplied).is_empty());
        assert!(act.is_pulsing());
    }

    #[test]
    fn test_pulse_fault_reported_on_next_apply() {
        let (mut act, pwm) = actuator();
        act.apply(HapticCommand::Pulsed {
            intensity: 50,
            rate_hz: 5,
        })
        .unwrap();
        pwm.set_failing(true);
        thread::sleep(Duration::from_millis(250));

        let result = act.apply(HapticCommand::Constant(10));
        assert!(matches!(result, Err(ActuatorError::PulseFault(_))));
        assert_eq!(act.current_command(), None);

        pwm.set_failing(false);
        act.apply(HapticCommand::Constant(10)).unwrap();
        assert_eq!(pwm.duty_cycle(), 10);
    }

    #[test]
    fn test_write_failure_surfaces() {
        let (mut act, pwm) = actuator();
        pwm.set_failing(true);
        assert!(matches!(
            act.apply(HapticCommand::Constant(50)),
            Err(ActuatorError::Pwm(_))
        ));
        assert_eq!(act.current_command(), None);
    }

    #[test]
    fn test_off_is_idempotent() {
        let (mut act, pwm) = actuator();
        act.apply(HapticCommand::Constant(100)).unwrap();
        act.off();
        act.off();
        assert_eq!(pwm.duty_cycle(), 0);
        assert_eq!(act.current_command(), Some(HapticCommand::Off));
    }

    #[test]
    fn test_buzz_returns_to_off() {
        let (mut act, pwm) = actuator();
        let start = Instant::now();
        act.buzz(Duration::from_millis(10)).unwrap();
        assert_eq!(pwm.writes_since(start), vec![100, 0]);
    }

    #[test]
    fn test_drop_turns_motor_off() {
        let (mut act, pwm) = actuator();
        act.apply(HapticCommand::Constant(60)).unwrap();
        drop(act);
        assert_eq!(pwm.duty_cycle(), 0);
    }
}
