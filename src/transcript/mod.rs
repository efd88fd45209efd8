//! Transcript ownership: the deduplicated log, session lifecycle,
//! similarity heuristics, queries, exports, and persistence.

pub mod engine;
pub mod export;
pub mod log;
pub mod similarity;
pub mod store;
pub mod types;

pub use engine::TranscriptEngine;
pub use export::ExportFormat;
pub use log::TranscriptLog;
pub use store::SessionStore;
pub use types::{
    DedupConfig, InterimEntry, SearchOptions, Session, SessionMetadata, SessionRecord,
    SessionSummary, SpeakerCounts, Transcript, TranscriptKind,
};
