use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioFragment, CaptureBackend};
use crate::config::CaptureConfig;

/// Header-level description of a WAV recording
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.sample_rate == 0 || spec.channels == 0 {
            anyhow::bail!("WAV file has an empty format description");
        }

        let duration_seconds = reader.duration() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels",
            duration_seconds, spec.sample_rate, spec.channels
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        })
    }
}

/// Capture backend that replays a WAV file as live input
///
/// Access is granted only if the file is a readable WAV. Capture streams the
/// file's bytes as fixed-size fragments at a steady pace, so the joined
/// fragments reproduce the file exactly.
pub struct FileCapture {
    path: PathBuf,
    fragment_bytes: usize,
    fragment_interval: Duration,
    contents: Option<Vec<u8>>,
    task: Option<JoinHandle<()>>,
}

impl FileCapture {
    pub fn new(path: impl Into<PathBuf>, config: &CaptureConfig) -> Self {
        Self {
            path: path.into(),
            fragment_bytes: config.fragment_bytes.max(1),
            fragment_interval: Duration::from_millis(config.fragment_interval_ms),
            contents: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileCapture {
    async fn request_access(&mut self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("WAV probe task panicked")??;

        let contents = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        self.contents = Some(contents);
        Ok(())
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFragment>> {
        let contents = self
            .contents
            .clone()
            .context("Capture started before access was granted")?;

        let (tx, rx) = mpsc::channel(64);
        let fragment_bytes = self.fragment_bytes;
        let interval = self.fragment_interval;

        self.task = Some(tokio::spawn(async move {
            let mut elapsed_ms = 0u64;
            for chunk in contents.chunks(fragment_bytes) {
                if tx.send(AudioFragment::new(chunk, elapsed_ms)).await.is_err() {
                    break;
                }
                tokio::time::sleep(interval).await;
                elapsed_ms += interval.as_millis() as u64;
            }
            info!("File capture reached end of input");
        }));

        info!("File capture started: {}", self.path.display());
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        match self.task.take() {
            Some(task) => {
                task.abort();
                info!("File capture stopped: {}", self.path.display());
            }
            None => warn!("File capture not active"),
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        "file"
    }
}
