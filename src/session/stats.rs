use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::emotion::EmotionDistribution;
use crate::error::SessionError;

/// Lifecycle of one capture-to-reply round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Recording,
    Encoding,
    AwaitingResponse,
    Error,
}

impl SessionState {
    /// Whether a caller should keep the start control disabled
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Recording | Self::Encoding | Self::AwaitingResponse)
    }
}

/// Counters accumulated over the lifetime of a controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Recordings that reached `Recording`
    pub recordings_started: usize,

    /// Envelopes the channel accepted
    pub recordings_sent: usize,

    /// Fragments buffered for the current recording
    pub fragments_buffered: usize,

    /// Replies received, parsed or not
    pub replies_received: usize,

    /// Replies that produced a history entry
    pub replies_parsed: usize,

    pub permission_denials: usize,
    pub encoding_failures: usize,
    pub parse_failures: usize,
    pub persistence_failures: usize,

    /// Sends dropped by the channel while unavailable
    pub dropped_sends: usize,
}

/// Point-in-time view handed to renderers and the HTTP surface
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,

    /// Id of the current or most recent recording
    pub recording_id: Option<Uuid>,

    /// States the current recording has passed through, in order
    pub trail: Vec<SessionState>,

    /// When the current or most recent recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Reply text as shown to the user
    pub last_reply: Option<String>,

    /// Distribution from the most recent reply, `None` if it failed to parse
    pub latest: Option<EmotionDistribution>,

    pub last_error: Option<SessionError>,

    pub stats: SessionStats,
}

impl SessionSnapshot {
    /// Whether the current round ended in a failure
    pub fn failed(&self) -> bool {
        self.trail.contains(&SessionState::Error)
    }
}
