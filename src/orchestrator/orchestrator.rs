//! Supervises N (capture, recognition-session) pairs as one atomic
//! recording session.
//!
//! Start opens every recognition session before any capture touches a
//! device; a single open failure rolls back what was opened and no
//! engine session is created. Stop is idempotent and always tears
//! everything down, accepting in-flight finals for a fixed grace period
//! before sealing. One stream's mid-session error never aborts the
//! recording: connectivity errors get a bounded backed-off reopen,
//! authentication errors kill only that stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::audio::{AudioSourceCapture, StreamSource};
use crate::error::RecordingStartError;
use crate::events::{EngineEvent, EventSender};
use crate::recognition::{
    LanguageConfig, RecognitionErrorKind, RecognitionEvent, StreamingRecognitionSession,
};
use crate::transcript::{SessionMetadata, SessionSummary, TranscriptEngine};

use super::messages::{ControlMessage, ResultMessage};

const RESULT_CHANNEL_DEPTH: usize = 256;
const CONTROL_CHANNEL_DEPTH: usize = 16;
/// Bound on waiting for a session's event pump to flush at teardown.
const PUMP_FLUSH: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long `stop_recording` keeps accepting in-flight finals
    pub stop_grace_ms: u64,
    /// Autosave cadence for the active session
    pub autosave_interval_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: 1500,
            autosave_interval_secs: 30,
        }
    }
}

/// One capture/recognition pair for a physical source.
pub struct StreamPair {
    source: StreamSource,
    capture: AudioSourceCapture,
    session: Arc<Mutex<StreamingRecognitionSession>>,
}

impl StreamPair {
    pub fn new(capture: AudioSourceCapture, session: StreamingRecognitionSession) -> Self {
        Self {
            source: capture.source(),
            capture,
            session: Arc::new(Mutex::new(session)),
        }
    }
}

/// Per-stream drop counters surfaced in status queries.
#[derive(Debug, Clone, Serialize)]
pub struct StreamCounters {
    pub source: StreamSource,
    pub capture_dropped: u64,
    pub recognition_dropped: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingStatus {
    pub recording: bool,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub transcript_count: usize,
    pub streams: Vec<StreamCounters>,
}

#[derive(Debug)]
pub enum ToggleOutcome {
    Started(String),
    Stopped(Option<SessionSummary>),
}

struct Inner {
    pairs: Vec<StreamPair>,
    recording: bool,
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    results_tx: Option<mpsc::Sender<ResultMessage>>,
    control_tx: Option<mpsc::Sender<ControlMessage>>,
    stop_tx: Option<watch::Sender<bool>>,
    pump: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
    routers: Vec<JoinHandle<()>>,
    autosave: Option<JoinHandle<()>>,
}

pub struct SessionOrchestrator {
    config: OrchestratorConfig,
    language: LanguageConfig,
    engine: Arc<Mutex<TranscriptEngine>>,
    events: EventSender,
    inner: Arc<Mutex<Inner>>,
}

impl SessionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        language: LanguageConfig,
        pairs: Vec<StreamPair>,
        engine: Arc<Mutex<TranscriptEngine>>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            language,
            engine,
            events,
            inner: Arc::new(Mutex::new(Inner {
                pairs,
                recording: false,
                session_id: None,
                started_at: None,
                results_tx: None,
                control_tx: None,
                stop_tx: None,
                pump: None,
                supervisor: None,
                routers: Vec::new(),
                autosave: None,
            })),
        }
    }

    /// Start recording on all streams atomically.
    ///
    /// Recognition sessions open first; any failure closes the ones
    /// already opened and returns a single aggregated error with no
    /// engine session created. Capture failures roll back the same way.
    pub async fn start_recording(&self) -> Result<String, RecordingStartError> {
        let mut inner = self.inner.lock().await;
        if inner.recording {
            warn!("Recording already started");
            return Ok(inner.session_id.clone().unwrap_or_default());
        }

        info!("Starting recording ({} streams)", inner.pairs.len());

        let (results_tx, results_rx) = mpsc::channel(RESULT_CHANNEL_DEPTH);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_DEPTH);

        // Phase 1: open every recognition session
        let mut opened: Vec<usize> = Vec::new();
        for i in 0..inner.pairs.len() {
            let source = inner.pairs[i].source;
            let session = Arc::clone(&inner.pairs[i].session);
            let result = session.lock().await.open(&self.language, results_tx.clone()).await;
            if let Err(e) = result {
                error!("Recognition session for {:?} failed to open: {}", source, e);
                for &j in &opened {
                    let session = Arc::clone(&inner.pairs[j].session);
                    session.lock().await.finish(PUMP_FLUSH).await;
                }
                return Err(RecordingStartError::new(format!(
                    "recognition session for {:?} failed to open: {}",
                    source, e
                )));
            }
            opened.push(i);
        }

        // Phase 2: acquire every capture
        for i in 0..inner.pairs.len() {
            let source = inner.pairs[i].source;
            let result = inner.pairs[i].capture.acquire().await;
            if let Err(e) = result {
                error!("Audio capture for {:?} failed: {}", source, e);
                for j in 0..i {
                    inner.pairs[j].capture.release().await;
                }
                for pair in &inner.pairs {
                    pair.session.lock().await.finish(PUMP_FLUSH).await;
                }
                return Err(RecordingStartError::new(format!(
                    "audio capture for {:?} failed: {}",
                    source, e
                )));
            }
        }

        // Phase 3: open the engine session and wire the tasks
        let session_id = self
            .engine
            .lock()
            .await
            .start_session(SessionMetadata::default());

        let (stop_tx, stop_rx) = watch::channel(false);

        let mut routers = Vec::new();
        for pair in &inner.pairs {
            let queue = pair.capture.queue();
            let session = Arc::clone(&pair.session);
            let source = pair.source;
            let mut stop = stop_rx.clone();
            routers.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = stop.changed() => break,
                        frame = queue.pop() => {
                            if !session.lock().await.push_frame(&frame) {
                                debug!("Dropping frame for {:?}: no open session", source);
                            }
                        }
                    }
                }
                debug!("Frame router for {:?} stopped", source);
            }));
        }

        inner.pump = Some(self.spawn_result_pump(results_rx, control_tx.clone()));
        inner.supervisor =
            Some(self.spawn_supervisor(control_rx, results_tx.clone(), stop_rx.clone()));
        inner.autosave = Some(self.spawn_autosave(stop_rx));

        inner.routers = routers;
        inner.recording = true;
        inner.session_id = Some(session_id.clone());
        inner.started_at = Some(Utc::now());
        inner.results_tx = Some(results_tx);
        inner.control_tx = Some(control_tx);
        inner.stop_tx = Some(stop_tx);

        info!("Recording started: {}", session_id);
        Ok(session_id)
    }

    /// Stop recording and seal the session. Idempotent: a second call
    /// is a no-op and emits no duplicate `session-ended`.
    pub async fn stop_recording(&self) -> Option<SessionSummary> {
        let mut inner = self.inner.lock().await;
        if !inner.recording {
            debug!("Stop requested but not recording");
            return None;
        }

        info!("Stopping recording");
        inner.recording = false;
        inner.session_id = None;
        inner.started_at = None;

        if let Some(stop) = inner.stop_tx.take() {
            let _ = stop.send(true);
        }

        // Stop feeding audio, then signal end-of-audio to the recognizer
        for pair in &mut inner.pairs {
            pair.capture.release().await;
        }
        for pair in &inner.pairs {
            pair.session.lock().await.close();
        }

        // Drop our result/control senders so the pump can drain
        inner.results_tx = None;
        inner.control_tx = None;

        let pump = inner.pump.take();
        let supervisor = inner.supervisor.take();
        let autosave = inner.autosave.take();
        let routers = std::mem::take(&mut inner.routers);
        let sessions: Vec<_> = inner
            .pairs
            .iter()
            .map(|p| Arc::clone(&p.session))
            .collect();
        drop(inner);

        // Grace period: finals still in flight land in the session
        tokio::time::sleep(Duration::from_millis(self.config.stop_grace_ms)).await;

        for session in &sessions {
            session.lock().await.finish(PUMP_FLUSH).await;
        }
        if let Some(supervisor) = supervisor {
            Self::join_or_abort(supervisor, PUMP_FLUSH, "supervisor").await;
        }
        if let Some(pump) = pump {
            Self::join_or_abort(pump, PUMP_FLUSH, "result pump").await;
        }
        for router in routers {
            Self::join_or_abort(router, PUMP_FLUSH, "frame router").await;
        }
        if let Some(autosave) = autosave {
            Self::join_or_abort(autosave, PUMP_FLUSH, "autosave").await;
        }

        let summary = self.engine.lock().await.end_session();
        info!("Recording stopped");
        summary
    }

    /// Start when idle, stop when recording.
    pub async fn toggle_recording(&self) -> Result<ToggleOutcome, RecordingStartError> {
        let recording = self.inner.lock().await.recording;
        if recording {
            Ok(ToggleOutcome::Stopped(self.stop_recording().await))
        } else {
            self.start_recording().await.map(ToggleOutcome::Started)
        }
    }

    pub async fn is_recording(&self) -> bool {
        self.inner.lock().await.recording
    }

    pub async fn status(&self) -> RecordingStatus {
        let inner = self.inner.lock().await;
        let mut streams = Vec::with_capacity(inner.pairs.len());
        for pair in &inner.pairs {
            streams.push(StreamCounters {
                source: pair.source,
                capture_dropped: pair.capture.dropped_frames(),
                recognition_dropped: pair.session.lock().await.dropped_frames(),
            });
        }
        let transcript_count = self.engine.lock().await.transcript_count();
        RecordingStatus {
            recording: inner.recording,
            session_id: inner.session_id.clone(),
            started_at: inner.started_at,
            transcript_count,
            streams,
        }
    }

    fn spawn_result_pump(
        &self,
        mut results_rx: mpsc::Receiver<ResultMessage>,
        control_tx: mpsc::Sender<ControlMessage>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(msg) = results_rx.recv().await {
                match msg.event {
                    RecognitionEvent::Interim { text, timestamp_ms } => {
                        engine
                            .lock()
                            .await
                            .add_interim(msg.source, &text, timestamp_ms);
                    }
                    RecognitionEvent::Final {
                        text,
                        confidence,
                        timestamp_ms,
                    } => {
                        engine
                            .lock()
                            .await
                            .add_final(msg.source, &text, confidence, timestamp_ms);
                    }
                    RecognitionEvent::Error { kind, message } => {
                        error!("Recognition error on {:?}: {}", msg.source, message);
                        let _ = events.send(EngineEvent::SessionError {
                            source: msg.source,
                            message,
                        });
                        if kind == RecognitionErrorKind::Connectivity {
                            let _ = control_tx
                                .send(ControlMessage::Reopen { source: msg.source })
                                .await;
                        }
                    }
                }
            }
            debug!("Result pump drained");
        })
    }

    fn spawn_supervisor(
        &self,
        mut control_rx: mpsc::Receiver<ControlMessage>,
        results_tx: mpsc::Sender<ResultMessage>,
        mut stop_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let language = self.language.clone();
        tokio::spawn(async move {
            loop {
                // Exiting on stop releases this task's result sender so
                // the pump can drain instead of waiting out a timeout.
                let msg = tokio::select! {
                    _ = stop_rx.changed() => break,
                    msg = control_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                match msg {
                    ControlMessage::Reopen { source } => {
                        let session = {
                            let guard = inner.lock().await;
                            if !guard.recording {
                                continue;
                            }
                            guard
                                .pairs
                                .iter()
                                .find(|p| p.source == source)
                                .map(|p| Arc::clone(&p.session))
                        };
                        let Some(session) = session else { continue };
                        let reopened = session
                            .lock()
                            .await
                            .reopen_with_backoff(&language, results_tx.clone())
                            .await;
                        match reopened {
                            Ok(()) => info!("Recognition stream {:?} reopened", source),
                            Err(e) => {
                                // The other stream keeps recording
                                error!("Giving up on {:?} recognition stream: {}", source, e);
                            }
                        }
                    }
                }
            }
            debug!("Supervisor stopped");
        })
    }

    fn spawn_autosave(&self, mut stop_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let interval = Duration::from_secs(self.config.autosave_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // discard the immediate first tick
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        engine.lock().await.autosave();
                    }
                }
            }
            debug!("Autosave task stopped");
        })
    }

    async fn join_or_abort(handle: JoinHandle<()>, wait: Duration, name: &str) {
        let mut handle = handle;
        if timeout(wait, &mut handle).await.is_err() {
            warn!("{} did not stop within {:?}, aborting", name, wait);
            handle.abort();
        }
    }
}
