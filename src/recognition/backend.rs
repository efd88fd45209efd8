use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::audio::StreamSource;
use crate::error::RecognitionError;

/// Language settings handed to the recognizer when a stream opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    pub language: String,
    pub interim_results: bool,
    /// Audio contract: 16 kHz mono 16-bit LE PCM
    pub sample_rate: u32,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            interim_results: true,
            sample_rate: 16000,
        }
    }
}

/// Events emitted by an open recognition stream.
///
/// Contract per stream: zero or more interims with non-decreasing
/// timestamps, then exactly one final per utterance with confidence in
/// [0, 1]. Distinct streams interleave arbitrarily.
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    Interim {
        text: String,
        timestamp_ms: u64,
    },
    Final {
        text: String,
        confidence: f32,
        timestamp_ms: u64,
    },
    Error {
        kind: RecognitionErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Fatal; the stream will not be reopened
    Authentication,
    /// Transient; eligible for bounded reopen
    Connectivity,
}

/// A live duplex connection to the recognizer for one stream.
///
/// Audio goes in through `frames` (raw 16 kHz mono i16 LE bytes);
/// dropping the sender is the graceful end-of-audio signal and lets the
/// recognizer flush its last final result before `events` closes.
pub struct RecognitionHandle {
    pub frames: mpsc::Sender<Vec<u8>>,
    pub events: mpsc::Receiver<RecognitionEvent>,
}

/// The external streaming recognition capability.
#[async_trait::async_trait]
pub trait RecognitionBackend: Send + Sync {
    /// Open a duplex stream bound to one logical stream identity.
    async fn open(
        &self,
        source: StreamSource,
        language: &LanguageConfig,
    ) -> Result<RecognitionHandle, RecognitionError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
