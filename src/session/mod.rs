//! Recording session management
//!
//! This module provides the capture-transmit-parse state machine:
//! - `AudioCaptureController`: microphone lifecycle, fragment buffering,
//!   encoding and transmission, reply handling
//! - `SessionRunner`: the single event loop feeding the controller
//! - `SessionHandle`: cloneable control and observation handle
//! - Session statistics and snapshots for renderers

mod controller;
mod runner;
mod stats;

pub use controller::{AudioCaptureController, SessionEvent, DISPLAY_FALLBACK};
pub use runner::{SessionCommand, SessionHandle, SessionRunner};
pub use stats::{SessionSnapshot, SessionState, SessionStats};
