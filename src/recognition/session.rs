//! One streaming recognition session per audio source.
//!
//! State machine: Idle → Opening → Active → Closing → Idle. Only Active
//! accepts frames. Open is timeout-bounded so a hung recognizer cannot
//! stall `start_recording`. Closing drops the frame sender, which is the
//! flush signal; the event pump keeps running so finals that are still
//! in flight reach the orchestrator during the stop grace period.

use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioFrame, StreamSource};
use crate::error::RecognitionError;
use crate::orchestrator::messages::ResultMessage;

use super::backend::{LanguageConfig, RecognitionBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Active,
    Closing,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionSessionConfig {
    /// Bound on how long `open` may take
    pub open_timeout_ms: u64,
    /// Connectivity reopen attempts before giving up on a stream
    pub max_reopen_attempts: u32,
    /// Initial reopen delay; doubles per attempt
    pub reopen_backoff_ms: u64,
}

impl Default for RecognitionSessionConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 10_000,
            max_reopen_attempts: 3,
            reopen_backoff_ms: 500,
        }
    }
}

impl RecognitionSessionConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

pub struct StreamingRecognitionSession {
    source: StreamSource,
    backend: Arc<dyn RecognitionBackend>,
    config: RecognitionSessionConfig,
    state: SessionState,
    frames: Option<mpsc::Sender<Vec<u8>>>,
    pump: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl StreamingRecognitionSession {
    pub fn new(
        source: StreamSource,
        backend: Arc<dyn RecognitionBackend>,
        config: RecognitionSessionConfig,
    ) -> Self {
        Self {
            source,
            backend,
            config,
            state: SessionState::Idle,
            frames: None,
            pump: None,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open the duplex stream. Fails fast with `AlreadyOpen` when not
    /// idle; bounded by the configured open timeout.
    pub async fn open(
        &mut self,
        language: &LanguageConfig,
        results: mpsc::Sender<ResultMessage>,
    ) -> Result<(), RecognitionError> {
        if self.state != SessionState::Idle {
            return Err(RecognitionError::AlreadyOpen(self.source));
        }
        self.state = SessionState::Opening;

        let open_timeout = self.config.open_timeout();
        let handle = match timeout(open_timeout, self.backend.open(self.source, language)).await {
            Err(_) => {
                self.state = SessionState::Idle;
                return Err(RecognitionError::OpenTimeout(open_timeout));
            }
            Ok(Err(e)) => {
                self.state = SessionState::Idle;
                return Err(e);
            }
            Ok(Ok(handle)) => handle,
        };

        self.frames = Some(handle.frames);

        let source = self.source;
        let mut events = handle.events;
        self.pump = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if results.send(ResultMessage { source, event }).await.is_err() {
                    debug!("Result channel closed, ending pump for {:?}", source);
                    return;
                }
            }
            debug!("Recognition events ended for {:?}", source);
        }));

        self.state = SessionState::Active;
        info!(
            "Recognition session active for {:?} via {}",
            source,
            self.backend.name()
        );
        Ok(())
    }

    /// Forward one frame of canonical PCM. Returns false instead of
    /// failing when there is no open session, letting the caller detect
    /// silently dropped audio.
    pub fn push_frame(&mut self, frame: &AudioFrame) -> bool {
        if self.state != SessionState::Active {
            return false;
        }
        match &self.frames {
            Some(tx) => match tx.try_send(frame.to_le_bytes()) {
                Ok(()) => true,
                Err(_) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
            },
            None => false,
        }
    }

    /// Graceful flush-and-end of the audio side. No-op when not open.
    /// The event pump stays alive so late finals still flow.
    pub fn close(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.state = SessionState::Closing;
        // Dropping the sender signals end-of-audio to the backend
        self.frames = None;
        self.state = SessionState::Idle;
        debug!("Recognition session closed for {:?}", self.source);
    }

    /// Close and tear down the event pump, bounded by `flush`.
    pub async fn finish(&mut self, flush: Duration) {
        self.close();
        if let Some(mut pump) = self.pump.take() {
            if timeout(flush, &mut pump).await.is_err() {
                warn!(
                    "Event pump for {:?} did not finish within {:?}, aborting",
                    self.source, flush
                );
                pump.abort();
            }
        }
    }

    /// Drop the connection without flushing, after a mid-session error.
    pub fn mark_failed(&mut self) {
        self.frames = None;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.state = SessionState::Idle;
    }

    /// Bounded, backed-off reopen after a transient connectivity error.
    /// Authentication failures propagate immediately and are never
    /// retried.
    pub async fn reopen_with_backoff(
        &mut self,
        language: &LanguageConfig,
        results: mpsc::Sender<ResultMessage>,
    ) -> Result<(), RecognitionError> {
        self.mark_failed();

        let mut delay = Duration::from_millis(self.config.reopen_backoff_ms);
        let mut last_error = None;

        for attempt in 1..=self.config.max_reopen_attempts {
            tokio::time::sleep(delay).await;
            info!(
                "Reopening recognition session for {:?} (attempt {}/{})",
                self.source, attempt, self.config.max_reopen_attempts
            );
            match self.open(language, results.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Reopen attempt {} for {:?} failed: {}", attempt, self.source, e);
                    last_error = Some(e);
                    delay *= 2;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RecognitionError::Connectivity("reopen failed with no attempts made".to_string())
        }))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// Frames discarded because the session was saturated.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
