//! Supervisor
//!
//! Owns the peripherals, starts both loops, and tears them down in a fixed
//! order: signal, join (bounded), motor off, let speech finish (bounded),
//! release.

use crate::alert_loop::{AlertLoop, SharedVision, ALERT_LOOP};
use crate::config::CaneConfig;
use crate::error::SupervisorError;
use crate::feedback::{FeedbackLoop, SharedActuator, FEEDBACK_LOOP};
use crate::health::{ComponentHealth, LoopHealth, LoopState};
use crate::lock;
use crate::retry::retry;
use crate::shared::SharedDistance;
use alerting::{DeliveryTracker, Speech, Vision};
use gpio::PwmOutput;
use haptics::{classify, HapticActuator, Zone};
use range_sensor::DistanceSensor;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Hardware and collaborators handed to the supervisor
pub struct Peripherals {
    pub sensor: Box<dyn DistanceSensor>,
    pub motor: Box<dyn PwmOutput>,
    pub vision: Box<dyn Vision>,
    pub speech: Arc<dyn Speech>,
}

/// Point-in-time status of the device
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub current_distance: Option<f64>,
    pub zone: Zone,
    pub feedback: LoopHealth,
    pub alert: LoopHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

/// Runs and supervises the feedback and alert loops
pub struct Supervisor {
    config: CaneConfig,
    phase: Phase,
    shared: SharedDistance,
    actuator: SharedActuator,
    vision: SharedVision,
    speech: Arc<dyn Speech>,
    /// Moved into the feedback loop on start
    sensor: Option<Box<dyn DistanceSensor>>,
    feedback_health: Arc<ComponentHealth>,
    alert_health: Arc<ComponentHealth>,
    shutdown_tx: watch::Sender<bool>,
    /// Moved into the feedback thread on start
    fatal_tx: Option<watch::Sender<bool>>,
    fatal_rx: watch::Receiver<bool>,
    feedback_thread: Option<thread::JoinHandle<Result<(), SupervisorError>>>,
    alert_task: Option<JoinHandle<()>>,
    deliveries: Option<DeliveryTracker>,
    announcements: Vec<JoinHandle<()>>,
    released: bool,
}

impl Supervisor {
    /// Take ownership of the peripherals; the motor is driven off immediately
    pub fn new(config: CaneConfig, peripherals: Peripherals) -> Result<Self, SupervisorError> {
        config.validate()?;

        let actuator = HapticActuator::new(peripherals.motor)
            .map_err(|e| SupervisorError::Init(format!("motor: {}", e)))?;

        let (shutdown_tx, _) = watch::channel(false);
        let (fatal_tx, fatal_rx) = watch::channel(false);

        Ok(Self {
            feedback_health: Arc::new(ComponentHealth::new(
                FEEDBACK_LOOP,
                config.feedback.max_errors,
            )),
            alert_health: Arc::new(ComponentHealth::new(ALERT_LOOP, config.alert.max_errors)),
            config,
            phase: Phase::Idle,
            shared: SharedDistance::new(),
            actuator: Arc::new(Mutex::new(actuator)),
            vision: Arc::new(Mutex::new(peripherals.vision)),
            speech: peripherals.speech,
            sensor: Some(peripherals.sensor),
            shutdown_tx,
            fatal_tx: Some(fatal_tx),
            fatal_rx,
            feedback_thread: None,
            alert_task: None,
            deliveries: None,
            announcements: Vec::new(),
            released: false,
        })
    }

    /// Acquire vision and start both loops.
    ///
    /// Vision that cannot be acquired does not prevent startup; the alert
    /// loop keeps retrying it while haptics run normally.
    pub async fn start(&mut self) -> Result<(), SupervisorError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Running => return Err(SupervisorError::AlreadyStarted),
            Phase::Stopped => return Err(SupervisorError::AlreadyStopped),
        }
        tokio::runtime::Handle::try_current()
            .map_err(|e| SupervisorError::Runtime(e.to_string()))?;

        info!("Starting supervisor");
        self.init_vision().await?;

        let (Some(sensor), Some(fatal_tx)) = (self.sensor.take(), self.fatal_tx.take()) else {
            return Err(SupervisorError::AlreadyStarted);
        };

        let feedback = FeedbackLoop::new(
            sensor,
            Arc::clone(&self.actuator),
            self.shared.clone(),
            Arc::clone(&self.feedback_health),
            self.config.feedback.clone(),
        );
        let shutdown = self.shutdown_tx.subscribe();
        let handle = thread::Builder::new()
            .name("feedback-loop".to_string())
            .spawn(move || {
                let result = feedback.run(shutdown);
                if let Err(e) = &result {
                    error!("Feedback loop terminated: {}", e);
                    fatal_tx.send_replace(true);
                }
                result
            })
            .map_err(|e| SupervisorError::Spawn("feedback loop thread", e.to_string()))?;
        self.feedback_thread = Some(handle);

        let alert_loop = AlertLoop::new(
            Arc::clone(&self.vision),
            Arc::clone(&self.speech),
            self.shared.clone(),
            Arc::clone(&self.alert_health),
            self.config.alert.clone(),
            self.config.vision_reinit.clone(),
        );
        self.deliveries = Some(alert_loop.gate().tracker());
        self.alert_task = Some(tokio::spawn(alert_loop.run(self.shutdown_tx.subscribe())));

        self.phase = Phase::Running;
        info!("Supervisor running");
        Ok(())
    }

    async fn init_vision(&self) -> Result<(), SupervisorError> {
        let vision = Arc::clone(&self.vision);
        let policy = self.config.vision_init.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut vision = lock(&vision);
            retry(&policy, "Vision initialization", |_| vision.initialize())
        })
        .await
        .map_err(|e| SupervisorError::Init(format!("vision worker: {}", e)))?;

        match result {
            Ok(()) => info!("Vision ready"),
            Err(e) => warn!("Vision unavailable, alerts degraded until it recovers: {}", e),
        }
        Ok(())
    }

    /// Speak `text` regardless of what else is playing. Stop waits for it
    /// within the speech grace period.
    pub fn announce(&mut self, text: &str) {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No runtime, announcement dropped: {}", text);
            return;
        }
        self.announcements.retain(|handle| !handle.is_finished());

        let speech = Arc::clone(&self.speech);
        let text = text.to_string();
        let handle = tokio::task::spawn_blocking(move || {
            if let Err(e) = speech.speak(&text, true) {
                warn!("Announcement '{}' failed: {}", text, e);
            }
        });
        self.announcements.push(handle);
    }

    /// Stop both loops and release the peripherals. Idempotent.
    pub async fn stop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        info!("Stopping supervisor");
        self.shutdown_tx.send_replace(true);

        let join_timeout = self.config.shutdown.join_timeout();
        self.join_feedback(join_timeout).await;
        self.join_alert(join_timeout).await;

        lock(&self.actuator).off();
        self.shared.publish(None);

        self.await_speech().await;
        self.release_peripherals(join_timeout).await;

        self.phase = Phase::Stopped;
        info!("Supervisor stopped");
    }

    async fn join_feedback(&mut self, timeout: Duration) {
        let Some(handle) = self.feedback_thread.take() else {
            return;
        };
        let started = Instant::now();
        while !handle.is_finished() && started.elapsed() < timeout {
            time::sleep(POLL_INTERVAL).await;
        }
        if !handle.is_finished() {
            warn!("Feedback loop did not stop within {:?}, detaching", timeout);
            return;
        }
        match handle.join() {
            Ok(Ok(())) => debug!("Feedback loop joined"),
            Ok(Err(e)) => debug!("Feedback loop joined after failure: {}", e),
            Err(_) => error!("Feedback loop thread panicked"),
        }
    }

    async fn join_alert(&mut self, timeout: Duration) {
        let Some(mut task) = self.alert_task.take() else {
            return;
        };
        match time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => debug!("Alert loop joined"),
            Ok(Err(e)) => error!("Alert loop task failed: {}", e),
            Err(_) => {
                warn!("Alert loop did not stop within {:?}, aborting", timeout);
                task.abort();
                self.alert_health.set_state(LoopState::Stopped);
            }
        }
    }

    /// Give in-flight speech up to the grace period
    async fn await_speech(&mut self) {
        let grace = self.config.shutdown.speech_grace();
        let started = Instant::now();
        loop {
            self.announcements.retain(|handle| !handle.is_finished());
            let pending = self.deliveries.as_ref().map_or(0, DeliveryTracker::in_flight)
                + self.announcements.len();
            if pending == 0 {
                return;
            }
            if started.elapsed() >= grace {
                warn!(
                    "{} utterances still playing after {:?}, not waiting",
                    pending, grace
                );
                self.announcements.clear();
                return;
            }
            time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn release_peripherals(&mut self, timeout: Duration) {
        if self.released {
            return;
        }
        self.released = true;

        // Only present if the feedback loop never started
        drop(self.sensor.take());

        let vision = Arc::clone(&self.vision);
        let release = tokio::task::spawn_blocking(move || lock(&vision).release());
        match time::timeout(timeout, release).await {
            Ok(Ok(())) => info!("Peripherals released"),
            Ok(Err(e)) => error!("Vision release failed: {}", e),
            Err(_) => warn!("Vision still busy, it will be released when the call returns"),
        }
    }

    /// Current distance, zone and loop health
    pub fn status(&self) -> StatusSnapshot {
        let current_distance = self.shared.current();
        StatusSnapshot {
            current_distance,
            zone: classify(current_distance).zone,
            feedback: self.feedback_health.snapshot(),
            alert: self.alert_health.snapshot(),
        }
    }

    /// Resolves once the feedback loop has given up
    pub async fn fatal(&self) {
        let mut rx = self.fatal_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Feedback loop ended cleanly; nothing will ever be fatal
                std::future::pending::<()>().await;
            }
        }
    }

    /// Whether the feedback loop has given up
    pub fn is_fatal(&self) -> bool {
        *self.fatal_rx.borrow()
    }

    pub fn config(&self) -> &CaneConfig {
        &self.config
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.phase == Phase::Running {
            warn!("Supervisor dropped while running; signalling loops and silencing motor");
            self.shutdown_tx.send_replace(true);
            lock(&self.actuator).off();
        }
    }
}
