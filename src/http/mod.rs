//! HTTP API for external control (hotkey daemons, editor plugins)
//!
//! - POST /recording/start - Start the dual-stream session
//! - POST /recording/stop - Stop and seal the session
//! - POST /recording/toggle - Flip recording state
//! - GET /recording/status - Recording state and per-stream counters
//! - GET /transcripts/recent?n= - Latest transcripts, oldest first
//! - GET /transcripts/search?q= - Filtered transcript search
//! - GET /session/export/:format - json | text | csv | srt
//! - GET /devices - Audio devices visible to the host
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
