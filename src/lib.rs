pub mod audio;
pub mod channel;
pub mod config;
pub mod emotion;
pub mod error;
pub mod history;
pub mod http;
pub mod session;
pub mod voice;

pub use audio::{AudioFile, AudioFragment, CaptureBackend, FileCapture};
pub use channel::{
    InferenceReply, MemoryTransport, NatsTransport, SessionChannel, TransmissionEnvelope, Transport,
};
pub use config::Config;
pub use emotion::{EmotionDistribution, EmotionLabel, EmotionSample};
pub use error::{ParseFailure, SessionError};
pub use history::{FileStore, HistoryEntry, KeyValueStore, MemoryStore, SessionHistoryLog, SessionHistoryStore};
pub use http::{create_router, AppState};
pub use session::{
    AudioCaptureController, SessionCommand, SessionHandle, SessionRunner, SessionSnapshot,
    SessionState, SessionStats,
};
pub use voice::{SpeechSynthesizer, Utterance, VoiceFeedbackEngine};
