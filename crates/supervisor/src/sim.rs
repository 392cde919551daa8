//! Simulated collaborators
//!
//! Used by the `smart-cane` binary when no camera or sensor wiring is
//! present, and by the tests.

use alerting::{Detection, Vision, VisionError};
use gpio::sim::SimulatedRanger;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct VisionCounters {
    detect_calls: AtomicUsize,
    init_calls: AtomicUsize,
    release_calls: AtomicUsize,
    fail_init: AtomicBool,
}

/// Observer for a [`ScriptedVision`] after it has been boxed away
#[derive(Debug, Clone)]
pub struct VisionProbe {
    counters: Arc<VisionCounters>,
}

impl VisionProbe {
    pub fn detect_calls(&self) -> usize {
        self.counters.detect_calls.load(Ordering::Acquire)
    }

    pub fn init_calls(&self) -> usize {
        self.counters.init_calls.load(Ordering::Acquire)
    }

    pub fn release_calls(&self) -> usize {
        self.counters.release_calls.load(Ordering::Acquire)
    }

    /// Make `initialize` fail from now on
    pub fn set_init_failing(&self, failing: bool) {
        self.counters.fail_init.store(failing, Ordering::Release);
    }
}

/// Vision that replays scripted frames
pub struct ScriptedVision {
    /// Frames returned in order; the last one repeats forever
    frames: VecDeque<Result<Vec<Detection>, VisionError>>,
    latency: Duration,
    counters: Arc<VisionCounters>,
}

impl ScriptedVision {
    /// Replay `frames` in order, then keep returning the last one
    pub fn script(frames: Vec<Result<Vec<Detection>, VisionError>>) -> Self {
        Self {
            frames: frames.into(),
            latency: Duration::ZERO,
            counters: Arc::default(),
        }
    }

    /// Same detections every frame
    pub fn repeating(detections: Vec<Detection>) -> Self {
        Self::script(vec![Ok(detections)])
    }

    /// Every frame capture fails
    pub fn failing() -> Self {
        Self::script(vec![Err(VisionError::Capture("no frame".to_string()))])
    }

    /// Demo scene: a person ahead and a car off to the side
    pub fn demo() -> Self {
        Self::script(vec![
            Ok(vec![]),
            Ok(vec![Detection::new("car", 0.82, false)]),
            Ok(vec![
                Detection::new("person", 0.91, true),
                Detection::new("car", 0.78, false),
            ]),
        ])
    }

    /// Delay every detect call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn handle(&self) -> VisionProbe {
        VisionProbe {
            counters: Arc::clone(&self.counters),
        }
    }
}

impl Vision for ScriptedVision {
    fn initialize(&mut self) -> Result<(), VisionError> {
        self.counters.init_calls.fetch_add(1, Ordering::AcqRel);
        if self.counters.fail_init.load(Ordering::Acquire) {
            return Err(VisionError::Open("simulated camera missing".to_string()));
        }
        debug!("Simulated vision initialized");
        Ok(())
    }

    fn detect(&mut self) -> Result<Vec<Detection>, VisionError> {
        self.counters.detect_calls.fetch_add(1, Ordering::AcqRel);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        let frame = if self.frames.len() > 1 {
            self.frames.pop_front()
        } else {
            self.frames.front().cloned()
        };
        frame.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn release(&mut self) {
        self.counters.release_calls.fetch_add(1, Ordering::AcqRel);
    }
}

/// Walks a [`SimulatedRanger`] through a distance script on a background
/// thread until dropped
pub struct DistanceScript {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DistanceScript {
    /// Approach an obstacle from open space, back off, repeat
    pub const APPROACH: [Option<f64>; 12] = [
        None,
        Some(200.0),
        Some(140.0),
        Some(110.0),
        Some(90.0),
        Some(70.0),
        Some(55.0),
        Some(40.0),
        Some(25.0),
        Some(10.0),
        Some(60.0),
        Some(160.0),
    ];

    pub fn spawn(ranger: SimulatedRanger, steps: Vec<Option<f64>>, dwell: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("distance-script".to_string())
            .spawn(move || {
                info!("Distance script running ({} steps, {:?} each)", steps.len(), dwell);
                for distance in steps.iter().cycle() {
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    debug!("Simulated obstacle at {:?}cm", distance);
                    ranger.set_distance(*distance);
                    thread::park_timeout(dwell);
                }
            })
            .ok();
        Self { stop, handle }
    }
}

impl Drop for DistanceScript {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_repeats_last_frame() {
        let mut vision = ScriptedVision::script(vec![
            Err(VisionError::Capture("blur".into())),
            Ok(vec![Detection::new("bus", 0.7, true)]),
        ]);
        let probe = vision.handle();

        assert!(vision.detect().is_err());
        for _ in 0..3 {
            assert_eq!(vision.detect().unwrap()[0].label, "bus");
        }
        assert_eq!(probe.detect_calls(), 4);
    }

    #[test]
    fn test_init_failure_toggle() {
        let mut vision = ScriptedVision::repeating(vec![]);
        let probe = vision.handle();
        assert!(vision.initialize().is_ok());
        probe.set_init_failing(true);
        assert!(matches!(vision.initialize(), Err(VisionError::Open(_))));
        vision.release();
        assert_eq!(probe.init_calls(), 2);
        assert_eq!(probe.release_calls(), 1);
    }

    #[test]
    fn test_distance_script_moves_ranger() {
        use range_sensor::{DistanceSensor, RangeSensor, SensorConfig};

        let ranger = SimulatedRanger::new(None);
        let (trigger, echo) = ranger.pins();
        let mut sensor = RangeSensor::new(trigger, echo, &SensorConfig::default()).unwrap();

        let script = DistanceScript::spawn(ranger, vec![Some(42.0)], Duration::from_millis(5));
        thread::sleep(Duration::from_millis(30));
        drop(script);

        let distance = sensor.measure().expect("scripted obstacle should echo");
        assert!((distance - 42.0).abs() < 5.0, "measured {}", distance);
    }
}
