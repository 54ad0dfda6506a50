//! HTTP control surface for the recording session
//!
//! A thin consumer of the core, used by the rendering layer:
//! - POST /session/start - Start recording (refused while a round is in flight)
//! - POST /session/stop - Stop recording and send it for inference
//! - GET /session/status - Current state, latest reply and distribution
//! - GET /history - Persisted history with chart colours
//! - DELETE /history - Clear history
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{HistoryEntryView, SampleView};
pub use routes::create_router;
pub use state::AppState;
