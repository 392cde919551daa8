//! Shared fixtures for the scenario tests

#![allow(dead_code)]

use alerting::{Speech, SpeechError};
use range_sensor::{DistanceSensor, Edge, SensorError};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use supervisor::config::{AlertLoopConfig, FeedbackConfig, ShutdownConfig};
use supervisor::{CaneConfig, RetryPolicy};

pub fn timeout() -> Result<f64, SensorError> {
    Err(SensorError::Timeout {
        edge: Edge::Rising,
        waited_ms: 100,
    })
}

/// Sensor whose reading tests can change while a loop runs
#[derive(Clone)]
pub struct FixedSensor {
    reading: Arc<Mutex<Result<f64, SensorError>>>,
    reads: Arc<AtomicUsize>,
}

impl FixedSensor {
    pub fn new(reading: Result<f64, SensorError>) -> Self {
        Self {
            reading: Arc::new(Mutex::new(reading)),
            reads: Arc::default(),
        }
    }

    pub fn set(&self, reading: Result<f64, SensorError>) {
        *self.reading.lock().unwrap() = reading;
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Acquire)
    }
}

impl DistanceSensor for FixedSensor {
    fn read(&mut self) -> Result<f64, SensorError> {
        self.reads.fetch_add(1, Ordering::AcqRel);
        self.reading.lock().unwrap().clone()
    }
}

/// Sensor replaying a script, then calling `on_done` once and reading clear
pub struct ScriptedSensor {
    script: VecDeque<Result<f64, SensorError>>,
    on_done: Option<Box<dyn FnOnce() + Send>>,
}

impl ScriptedSensor {
    pub fn new(script: Vec<Result<f64, SensorError>>, on_done: impl FnOnce() + Send + 'static) -> Self {
        Self {
            script: script.into(),
            on_done: Some(Box::new(on_done)),
        }
    }
}

impl DistanceSensor for ScriptedSensor {
    fn read(&mut self) -> Result<f64, SensorError> {
        if let Some(next) = self.script.pop_front() {
            return next;
        }
        if let Some(done) = self.on_done.take() {
            done();
        }
        Ok(200.0)
    }
}

/// Speech that records what it was asked to say
#[derive(Clone, Default)]
pub struct RecordingSpeech {
    spoken: Arc<Mutex<Vec<String>>>,
}

impl RecordingSpeech {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

impl Speech for RecordingSpeech {
    fn speak(&self, text: &str, _force: bool) -> Result<bool, SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(true)
    }
}

/// Speech that takes `per_utterance` to say anything, like a real synthesizer
#[derive(Clone)]
pub struct SlowSpeech {
    per_utterance: Duration,
    inner: RecordingSpeech,
}

impl SlowSpeech {
    pub fn new(per_utterance: Duration) -> Self {
        Self {
            per_utterance,
            inner: RecordingSpeech::default(),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.inner.spoken()
    }
}

impl Speech for SlowSpeech {
    fn speak(&self, text: &str, force: bool) -> Result<bool, SpeechError> {
        std::thread::sleep(self.per_utterance);
        self.inner.speak(text, force)
    }
}

/// Configuration with short periods so scenarios finish quickly
pub fn fast_config() -> CaneConfig {
    CaneConfig {
        feedback: FeedbackConfig {
            period_ms: 5,
            max_errors: 10,
            backoff_ms: 1,
            startup_buzz_ms: 0,
        },
        alert: AlertLoopConfig {
            period_ms: 10,
            max_errors: 5,
            backoff_ms: 1,
            vision_timeout_ms: 500,
            max_sample_age_ms: 60_000,
            ..Default::default()
        },
        vision_init: RetryPolicy::new(2, Duration::from_millis(1)),
        vision_reinit: RetryPolicy::once(),
        shutdown: ShutdownConfig {
            join_timeout_ms: 1000,
            speech_grace_ms: 200,
        },
        ..Default::default()
    }
}

/// Poll `condition` until it holds or `limit` passes
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Await `future` or fail the test after `limit`
pub async fn within<F: Future>(limit: Duration, future: F) -> F::Output {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation did not finish in time")
}
