//! NATS-backed recognition transport.
//!
//! Audio frames are published as base64 PCM on a per-stream subject and
//! interim/final results come back on a per-stream result subject from
//! the STT service. Each `open` creates its own connection, so streams
//! fail independently.

use base64::Engine as _;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::audio::StreamSource;
use crate::error::RecognitionError;

use super::backend::{
    LanguageConfig, RecognitionBackend, RecognitionErrorKind, RecognitionEvent, RecognitionHandle,
};

const EVENT_CHANNEL_DEPTH: usize = 256;
const FRAME_CHANNEL_DEPTH: usize = 256;
/// How long the result subscriber keeps draining after end-of-audio, so
/// the recognizer's flush final still lands.
const RESULT_FLUSH: Duration = Duration::from_millis(500);

/// Audio frame message published to the STT service.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamFrameMessage {
    pub stream_id: String,
    pub sequence: u32,
    /// Base64-encoded 16 kHz mono i16 LE PCM
    pub pcm: String,
    pub sample_rate: u32,
    pub language: String,
    /// RFC3339 wall-clock send time
    pub sent_at: String,
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Recognition result message received from the STT service.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamResultMessage {
    pub stream_id: String,
    pub text: String,
    pub partial: bool,
    pub confidence: f32,
    pub timestamp_ms: u64,
}

/// Parse one result payload and forward it for the expected stream.
/// Returns false once the session side has gone away.
async fn forward_result(
    payload: &[u8],
    expected_stream_id: &str,
    event_tx: &mpsc::Sender<RecognitionEvent>,
) -> bool {
    let result = match serde_json::from_slice::<StreamResultMessage>(payload) {
        Ok(result) => result,
        Err(e) => {
            warn!("Failed to parse result message: {}", e);
            return true;
        }
    };
    if result.stream_id != expected_stream_id {
        return true;
    }
    let event = if result.partial {
        RecognitionEvent::Interim {
            text: result.text,
            timestamp_ms: result.timestamp_ms,
        }
    } else {
        RecognitionEvent::Final {
            text: result.text,
            confidence: result.confidence,
            timestamp_ms: result.timestamp_ms,
        }
    };
    event_tx.send(event).await.is_ok()
}

pub struct NatsRecognitionBackend {
    url: String,
}

impl NatsRecognitionBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn audio_subject(source: StreamSource) -> String {
        format!("audio.frame.{}", source.stream_id())
    }

    fn result_subject(source: StreamSource) -> String {
        format!("stt.result.{}", source.stream_id())
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for NatsRecognitionBackend {
    async fn open(
        &self,
        source: StreamSource,
        language: &LanguageConfig,
    ) -> Result<RecognitionHandle, RecognitionError> {
        info!("Connecting to NATS at {} for {:?}", self.url, source);

        let client = async_nats::connect(&self.url).await.map_err(|e| {
            let message = e.to_string();
            if message.to_lowercase().contains("auth") {
                RecognitionError::Authentication(message)
            } else {
                RecognitionError::Connectivity(message)
            }
        })?;

        let mut subscriber = client
            .subscribe(Self::result_subject(source))
            .await
            .map_err(|e| RecognitionError::Connectivity(e.to_string()))?;

        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(FRAME_CHANNEL_DEPTH);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_DEPTH);
        let (done_tx, done_rx) = oneshot::channel::<()>();

        // Outbound: forward PCM until the session drops its sender, then
        // publish the end-of-audio marker so the recognizer flushes.
        let publisher = client.clone();
        let subject = Self::audio_subject(source);
        let lang = language.clone();
        let stream_id = source.stream_id().to_string();
        let outbound_events = event_tx.clone();
        tokio::spawn(async move {
            let mut sequence = 0u32;
            while let Some(pcm) = frame_rx.recv().await {
                let message = StreamFrameMessage {
                    stream_id: stream_id.clone(),
                    sequence,
                    pcm: base64::engine::general_purpose::STANDARD.encode(&pcm),
                    sample_rate: lang.sample_rate,
                    language: lang.language.clone(),
                    sent_at: chrono::Utc::now().to_rfc3339(),
                    final_frame: false,
                };
                sequence += 1;
                let payload = match serde_json::to_vec(&message) {
                    Ok(p) => p,
                    Err(e) => {
                        error!("Failed to encode frame message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = publisher.publish(subject.clone(), payload.into()).await {
                    warn!("Failed to publish audio frame for {}: {}", stream_id, e);
                    let _ = outbound_events
                        .send(RecognitionEvent::Error {
                            kind: RecognitionErrorKind::Connectivity,
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            }

            // End-of-audio marker
            let marker = StreamFrameMessage {
                stream_id: stream_id.clone(),
                sequence,
                pcm: String::new(),
                sample_rate: lang.sample_rate,
                language: lang.language.clone(),
                sent_at: chrono::Utc::now().to_rfc3339(),
                final_frame: true,
            };
            if let Ok(payload) = serde_json::to_vec(&marker) {
                if let Err(e) = publisher.publish(subject.clone(), payload.into()).await {
                    warn!("Failed to publish end-of-audio marker for {}: {}", stream_id, e);
                }
            }
            let _ = done_tx.send(());
            debug!("Audio publisher for {} finished", stream_id);
        });

        // Inbound: parse result messages and forward them as events.
        // Runs until the audio side signals end-of-audio, then drains a
        // bounded flush window and unsubscribes; dropping `event_tx`
        // here is what lets the session's pump finish.
        let expected_stream_id = source.stream_id().to_string();
        tokio::spawn(async move {
            let mut done_rx = done_rx;
            loop {
                tokio::select! {
                    msg = subscriber.next() => match msg {
                        Some(msg) => {
                            if !forward_result(&msg.payload, &expected_stream_id, &event_tx).await {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = &mut done_rx => {
                        let flush = tokio::time::sleep(RESULT_FLUSH);
                        tokio::pin!(flush);
                        loop {
                            tokio::select! {
                                msg = subscriber.next() => match msg {
                                    Some(msg) => {
                                        if !forward_result(
                                            &msg.payload,
                                            &expected_stream_id,
                                            &event_tx,
                                        )
                                        .await
                                        {
                                            break;
                                        }
                                    }
                                    None => break,
                                },
                                _ = &mut flush => break,
                            }
                        }
                        break;
                    }
                }
            }
            if let Err(e) = subscriber.unsubscribe().await {
                debug!("Unsubscribe for {} failed: {}", expected_stream_id, e);
            }
            debug!("Result subscriber for {} finished", expected_stream_id);
        });

        Ok(RecognitionHandle {
            frames: frame_tx,
            events: event_rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_are_per_stream() {
        assert_eq!(
            NatsRecognitionBackend::audio_subject(StreamSource::Microphone),
            "audio.frame.mic"
        );
        assert_eq!(
            NatsRecognitionBackend::result_subject(StreamSource::SystemAudio),
            "stt.result.system"
        );
    }

    #[test]
    fn frame_message_serializes_final_flag_as_final() {
        let message = StreamFrameMessage {
            stream_id: "mic".to_string(),
            sequence: 3,
            pcm: String::new(),
            sample_rate: 16000,
            language: "en-US".to_string(),
            sent_at: "2026-08-30T00:00:00Z".to_string(),
            final_frame: true,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"final\":true"));
    }
}
