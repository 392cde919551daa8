//! Smart Cane - Main Entry Point
//!
//! Runs the supervisor against simulated peripherals: an ultrasonic sensor
//! replaying an approach/retreat script, a recording motor pin and scripted
//! vision. Usage: `smart-cane [config.toml]`.

use anyhow::{Context, Result};
use gpio::sim::{RecordingPwm, SimulatedRanger};
use range_sensor::RangeSensor;
use std::path::PathBuf;
use std::time::Duration;
use supervisor::logging::init_logging;
use supervisor::sim::{DistanceScript, ScriptedVision};
use supervisor::speech::build_speech;
use supervisor::{CaneConfig, Peripherals, Supervisor};
use tracing::{error, info, warn};

const MOTOR_PIN: u8 = 18;
const STATUS_INTERVAL: Duration = Duration::from_secs(5);
const SCRIPT_DWELL: Duration = Duration::from_millis(1500);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = CaneConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.logging)?;

    info!("=== Smart Cane v{} ===", env!("CARGO_PKG_VERSION"));

    let ranger = SimulatedRanger::new(None);
    let (trigger, echo) = ranger.pins();
    let sensor = RangeSensor::new(trigger, echo, &config.sensor).context("range sensor")?;
    let _script = DistanceScript::spawn(ranger, DistanceScript::APPROACH.to_vec(), SCRIPT_DWELL);

    let peripherals = Peripherals {
        sensor: Box::new(sensor),
        motor: Box::new(RecordingPwm::new(MOTOR_PIN)),
        vision: Box::new(ScriptedVision::demo()),
        speech: build_speech(&config.speech),
    };

    let mut supervisor = Supervisor::new(config, peripherals)?;
    supervisor.announce("Smart cane starting");
    supervisor.start().await?;
    supervisor.announce("Smart cane ready");

    let exhausted = {
        let mut status = tokio::time::interval(STATUS_INTERVAL);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let fatal = supervisor.fatal();
        tokio::pin!(fatal);

        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        warn!("Ctrl-C handler failed: {}", e);
                    }
                    info!("Shutdown requested");
                    break false;
                }
                _ = &mut fatal => {
                    error!("Feedback loop exhausted, shutting down");
                    break true;
                }
                _ = status.tick() => {
                    match serde_json::to_string(&supervisor.status()) {
                        Ok(json) => info!("Status: {}", json),
                        Err(e) => warn!("Failed to serialize status: {}", e),
                    }
                }
            }
        }
    };

    supervisor.announce("Smart cane stopping");
    supervisor.stop().await;

    if exhausted {
        std::process::exit(1);
    }
    Ok(())
}
