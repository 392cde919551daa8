//! Speech backends

use crate::config::{SpeechBackend, SpeechConfig};
use alerting::{Speech, SpeechError};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Counts utterances in progress; non-forced speech only starts when idle
#[derive(Debug, Default)]
struct Busy(AtomicUsize);

impl Busy {
    /// Claim a speaking slot. Forced claims always succeed.
    fn claim(&self, force: bool) -> Option<BusyGuard<'_>> {
        if force {
            self.0.fetch_add(1, Ordering::AcqRel);
        } else if self
            .0
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(BusyGuard(&self.0))
    }

    fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire) > 0
    }
}

struct BusyGuard<'a>(&'a AtomicUsize);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Speaks through the `espeak` command-line synthesizer
#[derive(Debug)]
pub struct EspeakSpeech {
    words_per_minute: u32,
    volume: u32,
    busy: Busy,
}

impl EspeakSpeech {
    /// Check that `espeak` can be run
    pub fn new(config: &SpeechConfig) -> Result<Self, SpeechError> {
        let probe = Command::new("espeak")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match probe {
            Ok(status) if status.success() => {}
            _ => return Err(SpeechError::Unavailable),
        }
        info!(
            "espeak ready ({} wpm, volume {})",
            config.words_per_minute, config.volume
        );
        Ok(Self {
            words_per_minute: config.words_per_minute,
            volume: config.volume,
            busy: Busy::default(),
        })
    }

    /// Whether an utterance is playing
    pub fn is_speaking(&self) -> bool {
        self.busy.is_busy()
    }
}

impl Speech for EspeakSpeech {
    fn speak(&self, text: &str, force: bool) -> Result<bool, SpeechError> {
        let Some(_guard) = self.busy.claim(force) else {
            return Ok(false);
        };

        let output = Command::new("espeak")
            .arg("-s")
            .arg(self.words_per_minute.to_string())
            .arg("-a")
            .arg(self.volume.to_string())
            .arg(text)
            .stdout(Stdio::null())
            .output()
            .map_err(|e| SpeechError::Backend(e.to_string()))?;

        if !output.status.success() {
            return Err(SpeechError::Backend(format!(
                "espeak exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(true)
    }
}

/// Writes utterances to the log, taking `per_word` per word to mimic playback
#[derive(Debug)]
pub struct LogSpeech {
    per_word: Duration,
    busy: Busy,
}

impl LogSpeech {
    pub fn new(per_word: Duration) -> Self {
        Self {
            per_word,
            busy: Busy::default(),
        }
    }
}

impl Speech for LogSpeech {
    fn speak(&self, text: &str, force: bool) -> Result<bool, SpeechError> {
        let Some(_guard) = self.busy.claim(force) else {
            return Ok(false);
        };
        info!("[speech] {}", text);
        let words = text.split_whitespace().count() as u32;
        thread::sleep(self.per_word * words);
        Ok(true)
    }
}

/// Build the configured backend, falling back to the log when espeak is missing
pub fn build_speech(config: &SpeechConfig) -> Arc<dyn Speech> {
    let per_word = Duration::from_millis(60_000 / u64::from(config.words_per_minute.max(1)));
    match config.backend {
        SpeechBackend::Espeak => match EspeakSpeech::new(config) {
            Ok(espeak) => Arc::new(espeak),
            Err(e) => {
                warn!("{}; speaking to the log instead", e);
                Arc::new(LogSpeech::new(per_word))
            }
        },
        SpeechBackend::Log => Arc::new(LogSpeech::new(per_word)),
    }
}
