//! Consumer-facing event bus.
//!
//! Every externally observable state change is published as a typed
//! `EngineEvent` on a broadcast channel. Consumers (UI, exporters,
//! analyzers) subscribe and receive their own copy; a send with no
//! subscribers is not an error.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::audio::StreamSource;
use crate::transcript::{SessionSummary, Transcript};

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new recording session was opened.
    SessionStarted {
        id: String,
        start_time: DateTime<Utc>,
    },
    /// Live preview of speech still in progress. Never persisted.
    InterimTranscript {
        source: StreamSource,
        speaker: &'static str,
        text: String,
        timestamp_ms: u64,
    },
    /// A final transcript was accepted into the log.
    FinalTranscript { transcript: Transcript },
    /// Rolling notification that the log changed.
    TranscriptUpdated { transcript_count: usize },
    /// A previously emitted final transcript was removed by the dedup
    /// override policy. Consumers should drop the entry with this id.
    TranscriptRetracted { id: Uuid },
    /// The session was sealed.
    SessionEnded { summary: SessionSummary },
    /// An audio source started delivering frames.
    SourceActive { source: StreamSource },
    /// An audio source stopped delivering frames.
    SourceInactive { source: StreamSource },
    /// A recognition session reported an error mid-recording.
    SessionError {
        source: StreamSource,
        message: String,
    },
    /// A session record could not be written. In-memory state is intact.
    PersistenceFailed { message: String },
}

pub type EventSender = broadcast::Sender<EngineEvent>;
pub type EventReceiver = broadcast::Receiver<EngineEvent>;

/// Create the event bus. Slow consumers that fall more than `capacity`
/// events behind observe a `Lagged` error and skip ahead.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}
