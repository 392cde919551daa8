//! Smart Cane Configuration
//!
//! Layered: built-in defaults, then an optional TOML file, then `CANE_*`
//! environment variables (`CANE_FEEDBACK__PERIOD_MS=40`).

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use alerting::AlertConfig;
use range_sensor::SensorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaneConfig {
    pub sensor: SensorConfig,
    pub feedback: FeedbackConfig,
    pub alert: AlertLoopConfig,
    /// Vision acquisition at startup
    pub vision_init: RetryPolicy,
    /// Vision reacquisition after repeated alert-loop failures
    pub vision_reinit: RetryPolicy,
    pub shutdown: ShutdownConfig,
    pub speech: SpeechConfig,
    pub logging: LoggingConfig,
}

impl Default for CaneConfig {
    fn default() -> Self {
        Self {
            sensor: SensorConfig::default(),
            feedback: FeedbackConfig::default(),
            alert: AlertLoopConfig::default(),
            vision_init: RetryPolicy::default(),
            vision_reinit: RetryPolicy::once(),
            shutdown: ShutdownConfig::default(),
            speech: SpeechConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Feedback (sensor → motor) loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Loop period (default: 50ms)
    pub period_ms: u64,
    /// Consecutive failures before the loop gives up (default: 10)
    pub max_errors: u32,
    /// Pause after a failed iteration (default: 100ms)
    pub backoff_ms: u64,
    /// Full-intensity cue when the loop comes up, 0 disables (default: 200ms)
    pub startup_buzz_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            period_ms: 50,
            max_errors: 10,
            backoff_ms: 100,
            startup_buzz_ms: 200,
        }
    }
}

impl FeedbackConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Alert (vision → speech) loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertLoopConfig {
    /// Loop period (default: 1000ms)
    pub period_ms: u64,
    /// Consecutive failures before vision is reinitialized (default: 5)
    pub max_errors: u32,
    /// Pause after a failed iteration (default: 2000ms)
    pub backoff_ms: u64,
    /// Bound on one vision call (default: 5000ms)
    pub vision_timeout_ms: u64,
    /// Distance samples older than this count as no reading (default: 1000ms)
    pub max_sample_age_ms: u64,
    /// Announcement policy
    #[serde(flatten)]
    pub policy: AlertConfig,
}

impl Default for AlertLoopConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            max_errors: 5,
            backoff_ms: 2000,
            vision_timeout_ms: 5000,
            max_sample_age_ms: 1000,
            policy: AlertConfig::default(),
        }
    }
}

impl AlertLoopConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_millis(self.vision_timeout_ms)
    }

    pub fn max_sample_age(&self) -> Duration {
        Duration::from_millis(self.max_sample_age_ms)
    }
}

/// Shutdown bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for each loop to finish (default: 2000ms)
    pub join_timeout_ms: u64,
    /// How long to let in-flight speech finish (default: 1000ms)
    pub speech_grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: 2000,
            speech_grace_ms: 1000,
        }
    }
}

impl ShutdownConfig {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn speech_grace(&self) -> Duration {
        Duration::from_millis(self.speech_grace_ms)
    }
}

/// Speech backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    /// `espeak` subprocess
    Espeak,
    /// Write utterances to the log only
    Log,
}

/// Speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Backend (default: espeak)
    pub backend: SpeechBackend,
    /// Speaking rate (default: 150)
    pub words_per_minute: u32,
    /// Amplitude 0-200 (default: 100)
    pub volume: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackend::Espeak,
            words_per_minute: 150,
            volume: 100,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Max level: trace, debug, info, warn, error (default: info)
    pub level: String,
    /// Emit JSON lines instead of text (default: false)
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl CaneConfig {
    /// Load configuration from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CANE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loops cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feedback.period_ms == 0 || self.alert.period_ms == 0 {
            return Err(ConfigError::Invalid("loop periods must be positive".into()));
        }
        if self.feedback.max_errors == 0 || self.alert.max_errors == 0 {
            return Err(ConfigError::Invalid("max_errors must be positive".into()));
        }
        if self.sensor.timeout_ms == 0 {
            return Err(ConfigError::Invalid("sensor timeout must be positive".into()));
        }
        let policy = &self.alert.policy;
        if !(policy.critical_distance_cm < policy.announce_distance_cm
            && policy.announce_distance_cm <= policy.trigger_distance_cm)
        {
            return Err(ConfigError::Invalid(format!(
                "alert distances must satisfy critical < announce <= trigger ({} / {} / {})",
                policy.critical_distance_cm,
                policy.announce_distance_cm,
                policy.trigger_distance_cm
            )));
        }
        if !(0.0..=1.0).contains(&policy.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold {} outside 0-1",
                policy.confidence_threshold
            )));
        }
        Ok(())
    }
}
