//! Error taxonomy, split by subsystem so callers can match on the
//! failure class instead of parsing strings.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::audio::StreamSource;

/// Failures opening or running an audio capture source.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device or file could not be opened/started
    #[error("failed to acquire audio source: {0}")]
    Acquisition(String),

    /// The source produces audio we cannot normalize to 16 kHz mono PCM
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),
}

/// Failures on the recognition boundary.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Credentials rejected. Fatal: reopening cannot help.
    #[error("recognition authentication failed: {0}")]
    Authentication(String),

    /// Transient transport failure, eligible for a bounded reopen
    #[error("recognition connectivity error: {0}")]
    Connectivity(String),

    /// A session for this stream is already open
    #[error("recognition session for {0:?} is already open")]
    AlreadyOpen(StreamSource),

    /// The backend did not answer the open within the bound
    #[error("recognition session open timed out after {0:?}")]
    OpenTimeout(Duration),
}

impl RecognitionError {
    /// Fatal errors kill the stream for the rest of the session;
    /// everything else may be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RecognitionError::Authentication(_))
    }
}

/// Aggregated failure from an atomic `start_recording`: everything that
/// was partially started has already been rolled back.
#[derive(Debug, Error)]
#[error("failed to start recording: {reason}")]
pub struct RecordingStartError {
    pub reason: String,
}

impl RecordingStartError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failures writing or reading session records on disk.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to create session directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write session file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read session file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize session record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authentication_is_fatal() {
        assert!(RecognitionError::Authentication("bad token".into()).is_fatal());
        assert!(!RecognitionError::Connectivity("refused".into()).is_fatal());
        assert!(!RecognitionError::OpenTimeout(Duration::from_secs(10)).is_fatal());
        assert!(!RecognitionError::AlreadyOpen(StreamSource::Microphone).is_fatal());
    }
}
