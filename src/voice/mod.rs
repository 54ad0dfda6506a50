//! Spoken feedback
//!
//! `VoiceFeedbackEngine` decides what to say; a `SpeechSynthesizer` says it.
//! Every call is fire-and-forget: nothing here waits for playback.

mod feedback;
mod synth;

pub use feedback::{preamble_for, VoiceFeedbackEngine, FALLBACK_REPLY, WAITING_PROMPTS};
pub use synth::{CommandSynthesizer, LogSynthesizer, MemorySynthesizer, SpeechSynthesizer, Utterance};
