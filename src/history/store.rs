use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::kv::KeyValueStore;
use crate::emotion::{EmotionDistribution, EmotionSample};
use crate::error::SessionError;

/// Key the log is persisted under
pub const HISTORY_KEY: &str = "recordingHistory";

/// One recorded reply, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Local wall-clock time, short form (e.g. "02:30 PM")
    pub timestamp: String,
    pub emotions: EmotionDistribution,
}

impl HistoryEntry {
    /// Stamp a distribution with the current local time
    pub fn now(emotions: EmotionDistribution, timestamp_format: &str) -> Self {
        Self {
            timestamp: chrono::Local::now().format(timestamp_format).to_string(),
            emotions,
        }
    }

    /// First sample of the distribution
    pub fn primary(&self) -> Option<&EmotionSample> {
        self.emotions.primary()
    }
}

/// Ordered, append-only sequence of entries
pub type SessionHistoryLog = Vec<HistoryEntry>;

/// Result of an append: the log as it now stands, and a persistence error if
/// the write did not make it to the durable store
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    pub log: SessionHistoryLog,
    pub error: Option<SessionError>,
}

/// Append-only history log backed by a key-value store
///
/// Writes are read-modify-write with no locking across processes, so two
/// writers sharing one store race and the last write wins. An in-memory mirror
/// holds the most recent view for renderers.
pub struct SessionHistoryStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    mirror: RwLock<SessionHistoryLog>,
}

impl SessionHistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, HISTORY_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            mirror: RwLock::new(Vec::new()),
        }
    }

    /// Read the persisted log, degrading to an empty log on any failure
    pub async fn load(&self) -> SessionHistoryLog {
        let log = match self.read().await {
            Ok(log) => log,
            Err(e) => {
                error!("Failed to read history: {}", e);
                Vec::new()
            }
        };

        *self.mirror.write().await = log.clone();
        log
    }

    /// Reload, append `entry`, persist the whole log
    ///
    /// The mirror always reflects the new entry, even when the write fails.
    pub async fn append(&self, entry: HistoryEntry) -> AppendOutcome {
        let mut log = match self.read().await {
            Ok(log) => log,
            Err(e) => {
                // Store unreadable: keep building on what we last saw
                warn!("History reload failed, appending to in-memory view: {}", e);
                self.mirror.read().await.clone()
            }
        };
        log.push(entry);

        let error = match self.write(&log).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to persist history: {}", e);
                Some(e)
            }
        };

        *self.mirror.write().await = log.clone();
        info!("History now holds {} entries", log.len());

        AppendOutcome { log, error }
    }

    /// Drop the persisted log and empty the mirror; safe to repeat
    pub async fn clear(&self) -> Option<SessionError> {
        let error = match self.store.remove(&self.key).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to remove history: {}", e);
                Some(SessionError::PersistenceFailure(e.to_string()))
            }
        };

        self.mirror.write().await.clear();
        info!("History cleared");
        error
    }

    /// Most recent view without touching the store
    pub async fn snapshot(&self) -> SessionHistoryLog {
        self.mirror.read().await.clone()
    }

    /// Store errors propagate; undecodable contents read as empty
    async fn read(&self) -> Result<SessionHistoryLog, SessionError> {
        let raw = self
            .store
            .get(&self.key)
            .await
            .map_err(|e| SessionError::PersistenceFailure(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(log) => Ok(log),
            Err(e) => {
                warn!("Stored history is not decodable, treating as empty: {}", e);
                Ok(Vec::new())
            }
        }
    }

    async fn write(&self, log: &SessionHistoryLog) -> Result<(), SessionError> {
        let encoded = serde_json::to_string(log)
            .map_err(|e| SessionError::PersistenceFailure(e.to_string()))?;
        self.store
            .set(&self.key, &encoded)
            .await
            .map_err(|e| SessionError::PersistenceFailure(e.to_string()))
    }
}
