//! Supervisor lifecycle scenarios

mod common;

use alerting::Detection;
use common::{fast_config, timeout, wait_until, within, FixedSensor, RecordingSpeech};
use gpio::sim::RecordingPwm;
use haptics::Zone;
use std::sync::Arc;
use std::time::Duration;
use supervisor::sim::{ScriptedVision, VisionProbe};
use supervisor::{LoopState, Peripherals, Supervisor, SupervisorError};

const LIMIT: Duration = Duration::from_secs(5);

struct Rig {
    supervisor: Supervisor,
    sensor: FixedSensor,
    pwm: RecordingPwm,
    vision: VisionProbe,
    speech: RecordingSpeech,
}

fn rig(distance_cm: f64, vision: ScriptedVision) -> Rig {
    let sensor = FixedSensor::new(Ok(distance_cm));
    let pwm = RecordingPwm::new(18);
    let probe = vision.handle();
    let speech = RecordingSpeech::default();
    let supervisor = Supervisor::new(
        fast_config(),
        Peripherals {
            sensor: Box::new(sensor.clone()),
            motor: Box::new(pwm.clone()),
            vision: Box::new(vision),
            speech: Arc::new(speech.clone()),
        },
    )
    .unwrap();
    Rig {
        supervisor,
        sensor,
        pwm,
        vision: probe,
        speech,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_tracks_distance() {
    let mut rig = rig(45.0, ScriptedVision::repeating(vec![]));
    rig.supervisor.start().await.unwrap();

    let supervisor = &rig.supervisor;
    assert!(wait_until(LIMIT, || supervisor.status().current_distance == Some(45.0)).await);
    let status = supervisor.status();
    assert_eq!(status.zone, Zone::Danger);
    assert_eq!(status.feedback.state, LoopState::Running);

    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["zone"], "danger");
    assert_eq!(json["current_distance"], 45.0);

    rig.supervisor.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_forces_motor_off_and_releases_once() {
    let mut rig = rig(20.0, ScriptedVision::repeating(vec![]));
    rig.supervisor.start().await.unwrap();

    let pwm = rig.pwm.clone();
    assert!(wait_until(LIMIT, || pwm.duty_cycle() == 100).await);

    within(LIMIT, rig.supervisor.stop()).await;
    assert_eq!(rig.pwm.duty_cycle(), 0);
    assert_eq!(rig.vision.release_calls(), 1);

    let status = rig.supervisor.status();
    assert_eq!(status.feedback.state, LoopState::Stopped);
    assert_eq!(status.alert.state, LoopState::Stopped);
    assert_eq!(status.current_distance, None);

    // Second stop is a no-op
    within(LIMIT, rig.supervisor.stop()).await;
    assert_eq!(rig.vision.release_calls(), 1);

    let reads = rig.sensor.reads();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(rig.sensor.reads(), reads);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sensor_loss_is_fatal() {
    let mut rig = rig(20.0, ScriptedVision::repeating(vec![]));
    rig.supervisor.start().await.unwrap();

    let pwm = rig.pwm.clone();
    assert!(wait_until(LIMIT, || pwm.duty_cycle() == 100).await);

    rig.sensor.set(timeout());
    within(LIMIT, rig.supervisor.fatal()).await;

    assert!(rig.supervisor.is_fatal());
    assert_eq!(rig.pwm.duty_cycle(), 0);
    let status = rig.supervisor.status();
    assert_eq!(status.feedback.state, LoopState::Exhausted);
    assert_eq!(status.feedback.consecutive_errors, 10);
    assert_eq!(status.zone, Zone::NoReading);

    within(LIMIT, rig.supervisor.stop()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_obstacle_announced_while_haptics_run() {
    let vision = ScriptedVision::repeating(vec![
        Detection::new("diningtable", 0.75, true),
        Detection::new("car", 0.9, false),
    ]);
    let mut rig = rig(50.0, vision);
    rig.supervisor.start().await.unwrap();

    let speech = rig.speech.clone();
    assert!(wait_until(LIMIT, || !speech.spoken().is_empty()).await);
    assert_eq!(speech.spoken()[0], "table ahead");
    assert!(rig.pwm.write_count() > 0);

    rig.supervisor.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_camera_does_not_block_haptics() {
    let vision = ScriptedVision::failing();
    vision.handle().set_init_failing(true);
    let mut rig = rig(20.0, vision);
    rig.supervisor.start().await.unwrap();

    let pwm = rig.pwm.clone();
    assert!(wait_until(LIMIT, || pwm.duty_cycle() == 100).await);
    // Startup used both attempts of its retry policy
    assert!(rig.vision.init_calls() >= 2);

    let supervisor = &rig.supervisor;
    assert!(wait_until(LIMIT, || supervisor.status().alert.reinit_attempts >= 1).await);
    assert_eq!(supervisor.status().feedback.state, LoopState::Running);

    rig.supervisor.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_announcements_finish_within_grace() {
    let mut rig = rig(200.0, ScriptedVision::repeating(vec![]));
    rig.supervisor.announce("Smart cane starting");
    rig.supervisor.start().await.unwrap();
    rig.supervisor.announce("Smart cane stopping");
    within(LIMIT, rig.supervisor.stop()).await;

    assert_eq!(
        rig.speech.spoken(),
        vec!["Smart cane starting".to_string(), "Smart cane stopping".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_twice_rejected() {
    let mut rig = rig(200.0, ScriptedVision::repeating(vec![]));
    rig.supervisor.start().await.unwrap();
    assert!(matches!(
        rig.supervisor.start().await,
        Err(SupervisorError::AlreadyStarted)
    ));
    rig.supervisor.stop().await;
    assert!(matches!(
        rig.supervisor.start().await,
        Err(SupervisorError::AlreadyStopped)
    ));
}
