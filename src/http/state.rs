use crate::history::SessionHistoryStore;
use crate::session::SessionHandle;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Control handle for the running session loop
    pub session: SessionHandle,

    /// Persisted history, read-only here except for clearing
    pub history: Arc<SessionHistoryStore>,
}

impl AppState {
    pub fn new(session: SessionHandle, history: Arc<SessionHistoryStore>) -> Self {
        Self { session, history }
    }
}
