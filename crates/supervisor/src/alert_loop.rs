//! Alert Loop
//!
//! Slow loop on the async runtime. Each tick reads the shared distance and,
//! when something is close enough, asks vision what it is. Vision runs on
//! the blocking pool under a timeout; speech is handed off as a detached
//! blocking task so the loop never waits on it.
//!
//! A vision call that outlives its timeout keeps the collaborator until it
//! returns. Later calls fail fast with `VisionError::Busy` instead of
//! queueing behind it, so at most one blocking thread is ever stuck in vision.

use crate::config::AlertLoopConfig;
use crate::error::LoopError;
use crate::health::{ComponentHealth, LoopState};
use crate::try_lock;
use crate::retry::{retry, RetryPolicy};
use crate::shared::SharedDistance;
use alerting::{
    Admission, Alert, AlertGate, Announcer, DeliveryTicket, Detection, Speech, Vision, VisionError,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Vision collaborator shared between the loop and the supervisor
pub type SharedVision = Arc<Mutex<Box<dyn Vision>>>;

/// Loop name used in logs and metrics
pub const ALERT_LOOP: &str = "alert";

/// What one iteration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Nothing close enough; vision not queried
    Idle,
    /// Vision ran, nothing worth saying
    Quiet,
    /// Alert handed to speech
    Announced(String),
    /// Alert blocked by cooldown or an in-flight delivery
    Suppressed(String),
}

/// The slow alerting loop
pub struct AlertLoop {
    vision: SharedVision,
    speech: Arc<dyn Speech>,
    gate: AlertGate,
    announcer: Announcer,
    shared: SharedDistance,
    health: Arc<ComponentHealth>,
    config: AlertLoopConfig,
    reinit: RetryPolicy,
}

impl AlertLoop {
    pub fn new(
        vision: SharedVision,
        speech: Arc<dyn Speech>,
        shared: SharedDistance,
        health: Arc<ComponentHealth>,
        config: AlertLoopConfig,
        reinit: RetryPolicy,
    ) -> Self {
        Self {
            vision,
            speech,
            gate: AlertGate::new(config.policy.cooldown()),
            announcer: Announcer::new(config.policy.clone()),
            shared,
            health,
            config,
            reinit,
        }
    }

    /// The gate deciding what gets spoken
    pub fn gate(&self) -> &AlertGate {
        &self.gate
    }

    /// One iteration
    pub async fn step(&mut self) -> Result<AlertOutcome, LoopError> {
        let distance = match self.shared.current_within(self.config.max_sample_age()) {
            Some(d) if d < self.config.policy.trigger_distance_cm => d,
            _ => {
                self.announcer.forget_all(&mut self.gate);
                return Ok(AlertOutcome::Idle);
            }
        };

        let detections = self.detect().await?;
        debug!(
            "Vision at {:.1}cm: {} detections",
            distance,
            detections.len()
        );

        let Some(alert) = self.announcer.assess(&detections, distance, &mut self.gate) else {
            return Ok(AlertOutcome::Quiet);
        };

        match self.gate.admit(&alert.key, Instant::now(), alert.force) {
            Admission::Fire(ticket) => {
                let key = alert.key.clone();
                self.deliver(alert, ticket);
                Ok(AlertOutcome::Announced(key))
            }
            Admission::Cooldown | Admission::InFlight => Ok(AlertOutcome::Suppressed(alert.key)),
        }
    }

    /// Run until `shutdown` flips to true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let max_errors = self.config.max_errors.max(1);
        info!(
            "Alert loop starting (period {:?}, trigger {}cm)",
            self.config.period(),
            self.config.policy.trigger_distance_cm
        );
        self.health.set_state(LoopState::Running);

        let mut ticker = time::interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let result = tokio::select! {
                result = self.step() => result,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(outcome) => {
                    self.health.record_success();
                    match outcome {
                        AlertOutcome::Announced(key) => debug!("Alert fired: {}", key),
                        AlertOutcome::Suppressed(key) => debug!("Alert suppressed: {}", key),
                        AlertOutcome::Idle | AlertOutcome::Quiet => {}
                    }
                }
                Err(e) => {
                    let errors = self.health.record_error();
                    warn!("Alert iteration failed ({}/{}): {}", errors, max_errors, e);
                    if errors % max_errors == 0 && self.reinitialize(errors, &mut shutdown).await {
                        break;
                    }
                    if wait_or_shutdown(self.config.backoff(), &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        self.health.set_state(LoopState::Stopped);
        info!("Alert loop stopped");
    }

    async fn detect(&self) -> Result<Vec<Detection>, LoopError> {
        let vision = Arc::clone(&self.vision);
        let timeout = self.config.vision_timeout();
        let task = tokio::task::spawn_blocking(move || match try_lock(&vision) {
            Some(mut vision) => vision.detect(),
            None => Err(VisionError::Busy),
        });

        match time::timeout(timeout, task).await {
            Err(_) => Err(VisionError::Timeout(timeout.as_millis() as u64).into()),
            Ok(Err(join)) => Err(LoopError::Worker(join.to_string())),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    fn deliver(&self, alert: Alert, ticket: DeliveryTicket) {
        info!("Announcing: {}", alert.text);
        metrics::counter!("cane_alerts_total", "kind" => alert.kind.as_str()).increment(1);
        let speech = Arc::clone(&self.speech);
        tokio::task::spawn_blocking(move || {
            let _ticket = ticket;
            match speech.speak(&alert.text, alert.force) {
                Ok(true) => {}
                Ok(false) => debug!("Speech busy, dropped: {}", alert.text),
                Err(e) => warn!("Speech failed for '{}': {}", alert.text, e),
            }
        });
    }

    /// Release and reacquire vision; errors reset only if it comes back.
    ///
    /// Bounded by the vision timeout plus the retry backoff. Returns true if
    /// shutdown was signalled while waiting.
    async fn reinitialize(&mut self, errors: u32, shutdown: &mut watch::Receiver<bool>) -> bool {
        warn!(
            "Alert loop at {} consecutive errors, reinitializing vision",
            errors
        );
        self.health.record_reinit();

        let vision = Arc::clone(&self.vision);
        let policy = self.reinit.clone();
        let budget = self.config.vision_timeout() * policy.max_attempts.max(1)
            + policy.backoff() * policy.max_attempts.saturating_sub(1);
        let task = tokio::task::spawn_blocking(move || {
            let Some(mut vision) = try_lock(&vision) else {
                return Err(VisionError::Busy);
            };
            vision.release();
            retry(&policy, "Vision reinitialization", |_| vision.initialize())
        });

        let result = tokio::select! {
            result = time::timeout(budget, task) => result,
            changed = shutdown.changed() => return changed.is_err() || *shutdown.borrow(),
        };

        match result {
            Ok(Ok(Ok(()))) => {
                info!("Vision reinitialized");
                self.health.reset_errors();
            }
            Ok(Ok(Err(e))) => warn!("Vision still unavailable, continuing degraded: {}", e),
            Ok(Err(join)) => error!("Vision reinitialization worker failed: {}", join),
            Err(_) => warn!("Vision reinitialization still running after {:?}", budget),
        }
        false
    }
}

/// Sleep for `duration`; true if shutdown was signalled meanwhile
async fn wait_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
