//! Recording supervision: atomic start/stop across streams, frame and
//! result routing, mid-session stream recovery.

pub mod messages;
#[allow(clippy::module_inception)]
pub mod orchestrator;

pub use messages::{ControlMessage, ResultMessage};
pub use orchestrator::{
    OrchestratorConfig, RecordingStatus, SessionOrchestrator, StreamCounters, StreamPair,
    ToggleOutcome,
};
