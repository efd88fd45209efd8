//! Typed messages between orchestration tasks. Frame hand-off uses the
//! capture `FrameQueue`; results and supervision commands flow through
//! these tagged unions instead of dynamic event fan-out.

use crate::audio::StreamSource;
use crate::recognition::RecognitionEvent;

/// A recognition event tagged with its originating stream.
#[derive(Debug)]
pub struct ResultMessage {
    pub source: StreamSource,
    pub event: RecognitionEvent,
}

/// Commands handled by the orchestrator's supervision task.
#[derive(Debug, Clone, Copy)]
pub enum ControlMessage {
    /// Reopen one stream after a transient connectivity error.
    Reopen { source: StreamSource },
}
