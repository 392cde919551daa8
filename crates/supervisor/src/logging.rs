//! Log subscriber setup

use crate::config::LoggingConfig;
use crate::error::SupervisorError;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global subscriber at the configured level
pub fn init_logging(config: &LoggingConfig) -> Result<(), SupervisorError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| SupervisorError::Logging(format!("unknown level '{}'", config.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_names(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| SupervisorError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_level() {
        let config = LoggingConfig {
            level: "chatty".to_string(),
            json: false,
        };
        assert!(matches!(
            init_logging(&config),
            Err(SupervisorError::Logging(_))
        ));
    }
}
