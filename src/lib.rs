pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod orchestrator;
pub mod recognition;
pub mod transcript;

pub use audio::{
    AudioBackend, AudioBackendFactory, AudioFrame, AudioSourceCapture, PerStream, RawAudioFrame,
    SourceSpec, StreamSource,
};
pub use config::Config;
pub use error::{CaptureError, PersistenceError, RecognitionError, RecordingStartError};
pub use events::{event_channel, EngineEvent, EventReceiver, EventSender};
pub use http::{create_router, AppState};
pub use orchestrator::{RecordingStatus, SessionOrchestrator, StreamPair, ToggleOutcome};
pub use recognition::{
    LanguageConfig, NatsRecognitionBackend, RecognitionBackend, StreamingRecognitionSession,
};
pub use transcript::{
    DedupConfig, ExportFormat, SearchOptions, SessionStore, SessionSummary, Transcript,
    TranscriptEngine,
};
