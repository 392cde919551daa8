//! Alerting System
//!
//! Decides which obstacles get announced and when:
//! - Cooldown per alert key with forced override and reset
//! - Non-overlap tracking for in-flight speech deliveries
//! - Visible-object tracking and phrase selection
//! - Vision and speech collaborator contracts

mod announcer;
mod collaborator;
mod config;
mod gate;

pub use announcer::{Alert, AlertKind, Announcer};
pub use collaborator::{Detection, Speech, SpeechError, Vision, VisionError};
pub use config::AlertConfig;
pub use gate::{Admission, AlertGate, AlertState, DeliveryTicket, DeliveryTracker};
