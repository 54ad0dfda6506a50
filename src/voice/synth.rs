use serde::Serialize;
use std::sync::Mutex;
use tracing::{error, info, warn};

/// What to say and how to say it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Utterance {
    pub text: String,
    /// BCP 47 locale, e.g. "en-US"
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
}

/// Speech output collaborator
///
/// `enqueue` returns immediately. Overlapping utterances are handled however
/// the implementation's platform handles them; nothing is queued here.
pub trait SpeechSynthesizer: Send + Sync {
    fn enqueue(&self, utterance: Utterance);

    /// Name for logging
    fn name(&self) -> &str;
}

/// Writes utterances to the log instead of speaking
#[derive(Debug, Default)]
pub struct LogSynthesizer;

impl SpeechSynthesizer for LogSynthesizer {
    fn enqueue(&self, utterance: Utterance) {
        info!(
            "Speaking ({}, rate={}, pitch={}): {}",
            utterance.lang, utterance.rate, utterance.pitch, utterance.text
        );
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Hands each utterance to an external text-to-speech program
///
/// The text is passed as the final argument. The child is reaped on a
/// background task so the caller never waits.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn enqueue(&self, utterance: Utterance) {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).arg(&utterance.text);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start speech program {}: {}", self.program, e);
                return;
            }
        };

        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {}
                Ok(status) => warn!("Speech program {} exited with {}", program, status),
                Err(e) => error!("Failed to wait for speech program {}: {}", program, e),
            }
        });
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Keeps every utterance it is given, for inspection
#[derive(Debug, Default)]
pub struct MemorySynthesizer {
    spoken: Mutex<Vec<Utterance>>,
}

impl MemorySynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken
            .lock()
            .map(|spoken| spoken.clone())
            .unwrap_or_default()
    }
}

impl SpeechSynthesizer for MemorySynthesizer {
    fn enqueue(&self, utterance: Utterance) {
        if let Ok(mut spoken) = self.spoken.lock() {
            spoken.push(utterance);
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}
