use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration, loaded from `config/emotion-vox.toml` and
/// `EMOTION_VOX__*` environment variables
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub channel: ChannelConfig,
    pub capture: CaptureConfig,
    pub history: HistoryConfig,
    pub voice: VoiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "emotion-vox".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Inference channel settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// NATS server URL
    pub url: String,
    /// Event `message` is published on `<prefix>.message`
    pub subject_prefix: String,
    /// Replies come back on `<prefix>.<client_id>.response`; random when unset
    pub client_id: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            subject_prefix: "emotion".to_string(),
            client_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Size of each fragment emitted by the file capture backend
    pub fragment_bytes: usize,
    /// Delay between fragments, simulating live capture
    pub fragment_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fragment_bytes: 16 * 1024,
            fragment_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Directory holding the durable store; `~` is expanded
    pub path: String,
    pub key: String,
    /// chrono format string for entry timestamps
    pub timestamp_format: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: "~/.emotion-vox".to_string(),
            key: crate::history::HISTORY_KEY.to_string(),
            timestamp_format: "%I:%M %p".to_string(),
        }
    }
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.path)
            .with_context(|| format!("Failed to expand history path {}", self.path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    /// External TTS program; utterances are only logged when unset
    pub command: Option<String>,
    pub command_args: Vec<String>,
    /// Speak the emotion preamble before the reply instead of the reply alone
    pub speak_preamble: bool,
    /// Speak a waiting statement after recording stops
    pub waiting_prompt: bool,
    pub waiting_prompt_delay_ms: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            lang: "en-US".to_string(),
            rate: 1.0,
            pitch: 1.0,
            command: None,
            command_args: Vec::new(),
            speak_preamble: false,
            waiting_prompt: true,
            waiting_prompt_delay_ms: 200,
        }
    }
}

impl Config {
    /// Load from an optional file (extension optional) layered with environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("EMOTION_VOX")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
