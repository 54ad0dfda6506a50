pub mod backend;
pub mod file;

pub use backend::{concatenate, AudioFragment, CaptureBackend};
pub use file::{AudioFile, FileCapture};
