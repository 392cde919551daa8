//! Supervisor Error Types

use alerting::VisionError;
use haptics::ActuatorError;
use range_sensor::SensorError;
use thiserror::Error;

/// Failure of a single loop iteration
#[derive(Debug, Error)]
pub enum LoopError {
    /// Sensor did not answer (timeouts, pin faults)
    #[error("Sensor fault: {0}")]
    Sensor(#[from] SensorError),

    /// Motor could not be driven; it has been forced off
    #[error("Actuator fault: {0}")]
    Actuator(#[from] ActuatorError),

    /// Vision collaborator failed or timed out
    #[error("Vision fault: {0}")]
    Vision(#[from] VisionError),

    /// Blocking worker panicked or was cancelled
    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Supervisor lifecycle errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Consecutive-error ceiling reached
    #[error("{loop_name} loop exhausted after {errors} consecutive errors")]
    Exhausted { loop_name: &'static str, errors: u32 },

    #[error("Supervisor already started")]
    AlreadyStarted,

    #[error("Supervisor already stopped")]
    AlreadyStopped,

    #[error("No tokio runtime available: {0}")]
    Runtime(String),

    #[error("Peripheral initialization failed: {0}")]
    Init(String),

    #[error("Failed to spawn {0}: {1}")]
    Spawn(&'static str, String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
