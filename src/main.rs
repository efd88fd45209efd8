use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use dualscribe::audio::{AudioBackendFactory, AudioSourceCapture, SourceSpec, StreamSource};
use dualscribe::events::{event_channel, EngineEvent};
use dualscribe::http::{create_router, AppState};
use dualscribe::orchestrator::{SessionOrchestrator, StreamPair};
use dualscribe::recognition::{NatsRecognitionBackend, StreamingRecognitionSession};
use dualscribe::transcript::{SessionStore, TranscriptEngine};
use dualscribe::Config;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "dualscribe", about = "Dual-stream live transcription service")]
struct Args {
    /// Config file path (without extension, config-crate style)
    #[arg(short, long, default_value = "config/dualscribe")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load_or_default(&args.config)?;

    info!("{} starting", cfg.service.name);
    info!("Recognition backend: {}", cfg.recognition.nats_url);

    let (events, event_rx) = event_channel(EVENT_CHANNEL_CAPACITY);

    let store = SessionStore::new(&cfg.persistence.sessions_dir)?;
    let engine = Arc::new(Mutex::new(TranscriptEngine::new(
        cfg.dedup.clone(),
        Some(store),
        events.clone(),
    )));

    let recognizer: Arc<dyn dualscribe::RecognitionBackend> =
        Arc::new(NatsRecognitionBackend::new(&cfg.recognition.nats_url));

    let mut pairs = Vec::new();
    let mut specs = vec![SourceSpec::Device {
        source: StreamSource::Microphone,
        device_id: cfg.audio.microphone_device.clone(),
    }];
    match &cfg.audio.system_device {
        Some(device_id) => specs.push(SourceSpec::Device {
            source: StreamSource::SystemAudio,
            device_id: Some(device_id.clone()),
        }),
        None => warn!(
            "No system audio device configured, capturing microphone only \
             (set audio.system_device to a loopback/monitor device id)"
        ),
    }
    for spec in &specs {
        let backend = AudioBackendFactory::create(spec)?;
        let capture = AudioSourceCapture::new(
            spec.source(),
            backend,
            cfg.audio.frame_queue_depth,
            events.clone(),
        );
        let session = StreamingRecognitionSession::new(
            spec.source(),
            recognizer.clone(),
            cfg.recognition.session.clone(),
        );
        pairs.push(StreamPair::new(capture, session));
    }

    let orchestrator = Arc::new(SessionOrchestrator::new(
        cfg.orchestrator.clone(),
        cfg.recognition.language.clone(),
        pairs,
        engine.clone(),
        events.clone(),
    ));

    spawn_event_logger(event_rx);

    let app = create_router(AppState::new(orchestrator, engine));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Drain engine events into the log so a headless run is observable.
fn spawn_event_logger(mut rx: dualscribe::EventReceiver) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(EngineEvent::SessionStarted { id, .. }) => info!("Session started: {}", id),
                Ok(EngineEvent::SessionEnded { summary }) => info!(
                    "Session ended: {} transcripts, avg confidence {:.2}",
                    summary.transcript_count, summary.average_confidence
                ),
                Ok(EngineEvent::FinalTranscript { transcript }) => {
                    info!("[{}] {}", transcript.speaker, transcript.text)
                }
                Ok(EngineEvent::SessionError { source, message }) => {
                    error!("Stream error on {:?}: {}", source, message)
                }
                Ok(EngineEvent::PersistenceFailed { message }) => {
                    error!("Persistence failure: {}", message)
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event logger lagged, skipped {} events", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
