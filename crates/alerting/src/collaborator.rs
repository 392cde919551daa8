//! Vision and speech collaborator contracts

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One object reported by the vision collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Class label (e.g. "person")
    pub label: String,
    /// Detection confidence (0.0 to 1.0)
    pub confidence: f32,
    /// Whether the object sits in the "ahead" region of the frame
    pub in_center: bool,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, in_center: bool) -> Self {
        Self {
            label: label.into(),
            confidence,
            in_center,
        }
    }

    /// Build a detection from a bounding box `[x0, y0, x1, y1]` in pixels.
    ///
    /// The object counts as ahead when its horizontal center falls inside
    /// `[center_start, center_end]` (fractions of `frame_width`).
    pub fn from_bbox(
        label: impl Into<String>,
        confidence: f32,
        bbox: [f32; 4],
        frame_width: f32,
        center_start: f32,
        center_end: f32,
    ) -> Self {
        let center_x = (bbox[0] + bbox[2]) / 2.0;
        let in_center =
            center_x >= frame_width * center_start && center_x <= frame_width * center_end;
        Self::new(label, confidence, in_center)
    }
}

/// Vision collaborator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisionError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Detection timed out after {0}ms")]
    Timeout(u64),

    #[error("Vision not initialized")]
    NotInitialized,

    #[error("Vision still busy with an earlier call")]
    Busy,
}

/// Captures a frame and returns what is in it
pub trait Vision: Send {
    /// Acquire camera and model
    fn initialize(&mut self) -> Result<(), VisionError>;

    /// Capture one frame and run detection; may return an empty list
    fn detect(&mut self) -> Result<Vec<Detection>, VisionError>;

    /// Release camera and model; safe to call more than once
    fn release(&mut self);
}

/// Speech collaborator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("Speech backend failed: {0}")]
    Backend(String),

    #[error("Speech backend unavailable")]
    Unavailable,
}

/// Blocking text-to-speech
pub trait Speech: Send + Sync {
    /// Speak `text`. Returns `false` when an utterance was already playing
    /// and `force` is not set.
    fn speak(&self, text: &str, force: bool) -> Result<bool, SpeechError>;
}
