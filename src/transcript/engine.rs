//! The authoritative, time-ordered, deduplicated transcript log for the
//! active recording session.
//!
//! All mutation goes through one owner (the orchestrator's result pump
//! holds this behind a single mutex), so the engine itself is plain
//! synchronous code. Malformed input is ignored with a log line, never
//! an error; persistence failures are reported as events and never roll
//! back in-memory state.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::{PerStream, StreamSource};
use crate::events::{EngineEvent, EventSender};

use super::export::{self, ExportFormat};
use super::log::TranscriptLog;
use super::similarity::similarity;
use super::store::SessionStore;
use super::types::{
    DedupConfig, InterimEntry, SearchOptions, Session, SessionMetadata, SessionRecord,
    SessionSummary, SpeakerCounts, Transcript, TranscriptKind,
};

pub struct TranscriptEngine {
    config: DedupConfig,
    session: Option<Session>,
    log: TranscriptLog,
    interim: PerStream<Option<InterimEntry>>,
    store: Option<SessionStore>,
    events: EventSender,
}

impl TranscriptEngine {
    pub fn new(config: DedupConfig, store: Option<SessionStore>, events: EventSender) -> Self {
        let log = TranscriptLog::new(config.max_buffer_size);
        Self {
            config,
            session: None,
            log,
            interim: PerStream::default(),
            store,
            events,
        }
    }

    /// Open a new session, sealing any prior one first. Log and interim
    /// state always start empty.
    pub fn start_session(&mut self, metadata: SessionMetadata) -> String {
        if self.session.is_some() {
            warn!("Starting a session while one is active; sealing the old one");
            self.end_session();
        }

        self.log.clear();
        self.interim = PerStream::default();

        let session = Session {
            id: format!("session-{}", Uuid::new_v4()),
            start_time: Utc::now(),
            end_time: None,
            metadata,
        };
        let id = session.id.clone();

        info!("Session started: {}", id);
        let _ = self.events.send(EngineEvent::SessionStarted {
            id: id.clone(),
            start_time: session.start_time,
        });

        self.session = Some(session);
        id
    }

    /// Seal the active session: set its end time, persist it, emit the
    /// summary. Returns None when no session is active (idempotent).
    pub fn end_session(&mut self) -> Option<SessionSummary> {
        let mut session = self.session.take()?;
        session.end_time = Some(Utc::now());

        let summary = self.summarize(&session);
        let record = SessionRecord {
            id: session.id.clone(),
            start_time: session.start_time,
            end_time: session.end_time,
            metadata: session.metadata.clone(),
            transcripts: self.log.to_vec(),
            summary: Some(summary.clone()),
            exported_at: Utc::now(),
        };
        self.persist(&record);

        info!(
            "Session ended: {} ({} transcripts, avg confidence {:.2})",
            session.id, summary.transcript_count, summary.average_confidence
        );
        let _ = self.events.send(EngineEvent::SessionEnded {
            summary: summary.clone(),
        });

        self.interim = PerStream::default();
        Some(summary)
    }

    /// Replace the live interim entry for a stream. Not persisted.
    pub fn add_interim(&mut self, source: StreamSource, text: &str, timestamp_ms: u64) {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty interim from {:?}", source);
            return;
        }
        if self.session.is_none() {
            debug!("Ignoring interim from {:?} with no active session", source);
            return;
        }

        *self.interim.get_mut(source) = Some(InterimEntry {
            text: text.to_string(),
            timestamp_ms,
        });

        let _ = self.events.send(EngineEvent::InterimTranscript {
            source,
            speaker: source.speaker_label(),
            text: text.to_string(),
            timestamp_ms,
        });
    }

    /// Commit a final result, applying the cross-stream dedup policy.
    /// Returns the stored transcript, or None when it was suppressed,
    /// empty, or arrived after the session was sealed.
    pub fn add_final(
        &mut self,
        source: StreamSource,
        text: &str,
        confidence: f32,
        timestamp_ms: u64,
    ) -> Option<Transcript> {
        let text = text.trim();
        if text.is_empty() {
            debug!("Ignoring empty final from {:?}", source);
            return None;
        }
        let Some(session) = &self.session else {
            info!(
                "Discarding late final from {:?} (session already sealed): {:?}",
                source, text
            );
            return None;
        };

        let candidate = Transcript {
            id: Uuid::new_v4(),
            session_id: session.id.clone(),
            source,
            speaker: source.speaker_label().to_string(),
            text: text.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            timestamp_ms,
            kind: TranscriptKind::Final,
        };

        // A non-preferred result is dropped outright when the preferred
        // stream already produced anything inside the window before it.
        if let Some(preferred) = self.config.preferred_source {
            if source != preferred && self.preferred_entry_in_window(preferred, timestamp_ms) {
                debug!(
                    "Suppressing {:?} final (preferred {:?} spoke within window): {:?}",
                    source, preferred, text
                );
                return None;
            }
        }

        match self.scan_for_duplicate(&candidate) {
            Some((score, matched_id, matched_source))
                if score >= self.config.similarity_threshold =>
            {
                match self.config.preferred_source {
                    Some(preferred) if matched_source == preferred => {
                        debug!(
                            "Suppressing {:?} final, duplicate of preferred entry (score {:.2})",
                            source, score
                        );
                        return None;
                    }
                    Some(preferred) if source == preferred => {
                        // The preferred stream wins retroactively: drop
                        // the stored entry and accept the candidate.
                        if let Some(removed) = self.log.remove(matched_id) {
                            info!(
                                "Retracting {:?} entry in favor of {:?} (score {:.2}): {:?}",
                                removed.source, source, score, removed.text
                            );
                            let _ = self
                                .events
                                .send(EngineEvent::TranscriptRetracted { id: removed.id });
                        }
                    }
                    _ => {
                        // No preference: keep the first-seen entry
                        debug!(
                            "Suppressing {:?} final, duplicate of earlier entry (score {:.2})",
                            source, score
                        );
                        return None;
                    }
                }
            }
            _ => {}
        }

        if let Some(evicted) = self.log.push(candidate.clone()) {
            debug!("Evicted oldest transcript {} (log full)", evicted.id);
        }
        *self.interim.get_mut(source) = None;

        let _ = self.events.send(EngineEvent::FinalTranscript {
            transcript: candidate.clone(),
        });
        let _ = self.events.send(EngineEvent::TranscriptUpdated {
            transcript_count: self.log.len(),
        });

        Some(candidate)
    }

    fn preferred_entry_in_window(&self, preferred: StreamSource, timestamp_ms: u64) -> bool {
        let window = self.config.duplicate_time_window_ms;
        self.log.iter_rev().any(|t| {
            t.source == preferred
                && t.timestamp_ms <= timestamp_ms
                && timestamp_ms - t.timestamp_ms <= window
        })
    }

    /// Highest-similarity match among the last K cross-stream entries
    /// inside the time window. Same-stream repeats are never compared.
    fn scan_for_duplicate(&self, candidate: &Transcript) -> Option<(f64, Uuid, StreamSource)> {
        let window = self.config.duplicate_time_window_ms;
        let mut best: Option<(f64, Uuid, StreamSource)> = None;

        for entry in self
            .log
            .iter_rev()
            .filter(|t| t.source != candidate.source)
            .filter(|t| candidate.timestamp_ms.abs_diff(t.timestamp_ms) <= window)
            .take(self.config.scan_depth)
        {
            let score = similarity(&candidate.text, &entry.text, self.config.containment_bonus);
            if best.map_or(true, |(b, _, _)| score > b) {
                best = Some((score, entry.id, entry.source));
            }
        }

        best
    }

    /// The last `n` stored transcripts, oldest-first.
    pub fn recent(&self, n: usize) -> Vec<Transcript> {
        let mut out: Vec<Transcript> = self.log.iter_rev().take(n).cloned().collect();
        out.reverse();
        out
    }

    /// Substring search over stored transcripts.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<Transcript> {
        let needle = if options.case_sensitive {
            query.to_string()
        } else {
            query.to_lowercase()
        };
        let limit = options.limit.unwrap_or(usize::MAX);

        self.log
            .iter()
            .filter(|t| match &options.speaker {
                Some(speaker) => t.speaker == *speaker,
                None => true,
            })
            .filter(|t| match options.range_ms {
                Some((from, to)) => t.timestamp_ms >= from && t.timestamp_ms <= to,
                None => true,
            })
            .filter(|t| {
                if options.case_sensitive {
                    t.text.contains(&needle)
                } else {
                    t.text.to_lowercase().contains(&needle)
                }
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Render the current log in the requested format.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        export::export(&self.log.to_vec(), format)
    }

    /// Persist the active session mid-flight. No-op without a session.
    pub fn autosave(&self) {
        let Some(session) = &self.session else {
            return;
        };
        let record = SessionRecord {
            id: session.id.clone(),
            start_time: session.start_time,
            end_time: None,
            metadata: session.metadata.clone(),
            transcripts: self.log.to_vec(),
            summary: None,
            exported_at: Utc::now(),
        };
        self.persist(&record);
    }

    fn persist(&self, record: &SessionRecord) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.save(record) {
            warn!("Persistence failed for {}: {}", record.id, e);
            let _ = self.events.send(EngineEvent::PersistenceFailed {
                message: e.to_string(),
            });
        }
    }

    fn summarize(&self, session: &Session) -> SessionSummary {
        let mut speakers: std::collections::HashMap<String, SpeakerCounts> =
            std::collections::HashMap::new();
        let mut confidence_sum = 0.0f64;
        let mut count = 0usize;

        for t in self.log.iter() {
            let counts = speakers.entry(t.speaker.clone()).or_default();
            counts.transcripts += 1;
            counts.words += t.text.split_whitespace().count();
            confidence_sum += t.confidence as f64;
            count += 1;
        }

        let duration_secs = session
            .end_time
            .unwrap_or_else(Utc::now)
            .signed_duration_since(session.start_time)
            .num_milliseconds() as f64
            / 1000.0;

        SessionSummary {
            transcript_count: count,
            speakers,
            average_confidence: if count > 0 {
                (confidence_sum / count as f64) as f32
            } else {
                0.0
            },
            duration_secs,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn transcript_count(&self) -> usize {
        self.log.len()
    }

    pub fn interim(&self, source: StreamSource) -> Option<&InterimEntry> {
        self.interim.get(source).as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;

    fn engine(config: DedupConfig) -> TranscriptEngine {
        let (events, _rx) = event_channel(64);
        TranscriptEngine::new(config, None, events)
    }

    #[test]
    fn empty_text_never_creates_a_transcript() {
        let mut eng = engine(DedupConfig::default());
        eng.start_session(SessionMetadata::default());
        assert!(eng.add_final(StreamSource::Microphone, "   ", 0.9, 100).is_none());
        assert!(eng.add_final(StreamSource::Microphone, "", 0.9, 200).is_none());
        assert_eq!(eng.transcript_count(), 0);
    }

    #[test]
    fn finals_clear_the_streams_interim_slot() {
        let mut eng = engine(DedupConfig {
            preferred_source: None,
            ..DedupConfig::default()
        });
        eng.start_session(SessionMetadata::default());
        eng.add_interim(StreamSource::Microphone, "hel", 500);
        eng.add_interim(StreamSource::Microphone, "hello wor", 800);
        assert_eq!(eng.interim(StreamSource::Microphone).unwrap().text, "hello wor");
        eng.add_final(StreamSource::Microphone, "hello world", 0.9, 1000);
        assert!(eng.interim(StreamSource::Microphone).is_none());
    }

    #[test]
    fn results_after_seal_are_discarded() {
        let mut eng = engine(DedupConfig::default());
        eng.start_session(SessionMetadata::default());
        eng.end_session();
        assert!(eng
            .add_final(StreamSource::SystemAudio, "too late", 0.9, 5000)
            .is_none());
    }

    #[test]
    fn start_session_resets_log_and_interim() {
        let mut eng = engine(DedupConfig {
            preferred_source: None,
            ..DedupConfig::default()
        });
        eng.start_session(SessionMetadata::default());
        eng.add_final(StreamSource::Microphone, "left over", 0.9, 100);
        eng.add_interim(StreamSource::SystemAudio, "half said", 200);
        eng.start_session(SessionMetadata::default());
        assert_eq!(eng.transcript_count(), 0);
        assert!(eng.interim(StreamSource::SystemAudio).is_none());
    }
}
