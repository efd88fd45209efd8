use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::audio::StreamSource;

/// Whether a transcript is a live preview or a committed utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptKind {
    Interim,
    Final,
}

/// One transcribed utterance, tagged by source. Immutable once stored,
/// except for removal by the dedup override policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,
    pub session_id: String,
    pub source: StreamSource,
    /// Fixed speaker tag derived from the source
    pub speaker: String,
    pub text: String,
    /// Recognizer confidence, clamped to [0, 1]
    pub confidence: f32,
    /// Milliseconds since the recording session started
    pub timestamp_ms: u64,
    pub kind: TranscriptKind,
}

/// Free-form metadata attached to a session at start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub title: Option<String>,
}

/// One bounded recording interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub start_time: DateTime<Utc>,
    /// None while the session is active
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

/// Per-speaker contribution counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakerCounts {
    pub transcripts: usize,
    pub words: usize,
}

/// Computed when a session is sealed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub transcript_count: usize,
    pub speakers: HashMap<String, SpeakerCounts>,
    pub average_confidence: f32,
    pub duration_secs: f64,
}

/// The persisted shape: one JSON file per sealed session, also written
/// periodically while the session is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub transcripts: Vec<Transcript>,
    pub summary: Option<SessionSummary>,
    pub exported_at: DateTime<Utc>,
}

/// Live interim state for one stream: at most one entry, overwritten on
/// each interim event, cleared by the stream's next final.
#[derive(Debug, Clone)]
pub struct InterimEntry {
    pub text: String,
    pub timestamp_ms: u64,
}

/// Tunables for near-duplicate suppression across streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Two transcripts further apart than this are never compared
    pub duplicate_time_window_ms: u64,
    /// Similarity at or above this suppresses/overrides
    pub similarity_threshold: f64,
    /// When set, this source wins conflicts in both directions
    pub preferred_source: Option<StreamSource>,
    /// Ring-buffer capacity of the transcript log
    pub max_buffer_size: usize,
    /// How many recent cross-stream entries the similarity scan visits
    pub scan_depth: usize,
    /// Heuristic score assigned when one short phrase is contained in
    /// the other. Tunable, not normative.
    pub containment_bonus: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            duplicate_time_window_ms: 3000,
            similarity_threshold: 0.8,
            preferred_source: Some(StreamSource::SystemAudio),
            max_buffer_size: 1000,
            scan_depth: 10,
            containment_bonus: 0.85,
        }
    }
}

/// Filters for transcript search.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchOptions {
    /// Exact speaker label match ("You" / "Other")
    pub speaker: Option<String>,
    /// Inclusive timestamp range in milliseconds
    pub range_ms: Option<(u64, u64)>,
    #[serde(default)]
    pub case_sensitive: bool,
    pub limit: Option<usize>,
}
