use anyhow::Result;
use tokio::sync::mpsc;

/// One opaque piece of captured audio
///
/// Fragments are concatenated in arrival order when a recording is finalized;
/// they are never reordered or dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFragment {
    /// Encoded audio bytes, meaningful only once all fragments are joined
    pub data: Vec<u8>,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFragment {
    pub fn new(data: impl Into<Vec<u8>>, timestamp_ms: u64) -> Self {
        Self {
            data: data.into(),
            timestamp_ms,
        }
    }
}

/// Join fragments, in order, into one transmittable unit
pub fn concatenate(fragments: Vec<AudioFragment>) -> Vec<u8> {
    let total = fragments.iter().map(|f| f.data.len()).sum();
    fragments
        .into_iter()
        .fold(Vec::with_capacity(total), |mut blob, fragment| {
            blob.extend_from_slice(&fragment.data);
            blob
        })
}

/// Audio capture collaborator
///
/// Implementations:
/// - `FileCapture`: replays a WAV file as if it were live input
/// - test doubles that script grants, denials and fragments
#[async_trait::async_trait]
pub trait CaptureBackend: Send {
    /// Ask for access to the input device
    ///
    /// An error means access was refused; the caller must not start capturing.
    async fn request_access(&mut self) -> Result<()>;

    /// Start capturing
    ///
    /// Returns a channel receiver that will receive fragments in capture order
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFragment>>;

    /// Stop capturing and release the input device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}
