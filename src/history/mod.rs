//! Durable session history
//!
//! - `KeyValueStore`: the get/set/remove collaborator (file-backed or in-memory)
//! - `SessionHistoryStore`: append-only log of timestamped emotion distributions

mod kv;
mod store;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use store::{AppendOutcome, HistoryEntry, SessionHistoryLog, SessionHistoryStore, HISTORY_KEY};
