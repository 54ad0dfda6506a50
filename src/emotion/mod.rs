//! Emotion data model and inference reply parsing
//!
//! This module owns the shape of the data handed to renderers:
//! - `EmotionSample` / `EmotionDistribution`, the normalized reply
//! - `EmotionLabel`, the enum-indexed colour lookup used by charts
//! - `parser`, which turns a raw reply into a distribution or a `ParseFailure`

mod label;
pub mod parser;
mod types;

pub use label::EmotionLabel;
pub use parser::{detect_mood, parse};
pub use types::{EmotionDistribution, EmotionSample, NEUTRAL_FLOOR_NAME, NEUTRAL_FLOOR_VALUE};
