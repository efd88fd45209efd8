// Integration tests for the streaming recognition session state
// machine: open/close lifecycle, frame gating, bounded open, and the
// backed-off reopen path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use dualscribe::audio::{AudioFrame, StreamSource};
use dualscribe::error::RecognitionError;
use dualscribe::orchestrator::ResultMessage;
use dualscribe::recognition::{
    LanguageConfig, RecognitionBackend, RecognitionEvent, RecognitionHandle,
    RecognitionSessionConfig, SessionState, StreamingRecognitionSession,
};
use tokio::sync::mpsc;

/// What one `open` call should do.
enum OpenScript {
    Succeed,
    Fail(RecognitionError),
    Hang,
}

/// Server-side ends of a successfully opened mock stream.
struct MockLink {
    frames: mpsc::Receiver<Vec<u8>>,
    events: mpsc::Sender<RecognitionEvent>,
}

/// Recognition backend driven by a per-call script. Successful opens
/// expose their server-side channel ends through `links` so tests can
/// inject events and observe outgoing frames.
struct MockRecognitionBackend {
    scripts: Mutex<VecDeque<OpenScript>>,
    links: Mutex<Vec<MockLink>>,
    opens: AtomicU32,
}

impl MockRecognitionBackend {
    fn new(scripts: Vec<OpenScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            links: Mutex::new(Vec::new()),
            opens: AtomicU32::new(0),
        }
    }

    fn take_link(&self) -> MockLink {
        self.links.lock().unwrap().pop().expect("no open link")
    }

    fn open_count(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RecognitionBackend for MockRecognitionBackend {
    async fn open(
        &self,
        _source: StreamSource,
        _language: &LanguageConfig,
    ) -> Result<RecognitionHandle, RecognitionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(OpenScript::Succeed);
        match script {
            OpenScript::Succeed => {
                let (frames_tx, frames_rx) = mpsc::channel(64);
                let (events_tx, events_rx) = mpsc::channel(64);
                self.links.lock().unwrap().push(MockLink {
                    frames: frames_rx,
                    events: events_tx,
                });
                Ok(RecognitionHandle {
                    frames: frames_tx,
                    events: events_rx,
                })
            }
            OpenScript::Fail(e) => Err(e),
            OpenScript::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

fn session_with(
    scripts: Vec<OpenScript>,
    config: RecognitionSessionConfig,
) -> (
    StreamingRecognitionSession,
    std::sync::Arc<MockRecognitionBackend>,
) {
    let backend = std::sync::Arc::new(MockRecognitionBackend::new(scripts));
    let session = StreamingRecognitionSession::new(
        StreamSource::Microphone,
        backend.clone(),
        config,
    );
    (session, backend)
}

fn frame() -> AudioFrame {
    AudioFrame {
        source: StreamSource::Microphone,
        pcm: vec![100, -100, 200, -200],
        timestamp_ms: 0,
    }
}

#[tokio::test]
async fn open_activates_and_accepts_frames() {
    let (mut session, backend) =
        session_with(vec![OpenScript::Succeed], RecognitionSessionConfig::default());
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    assert_eq!(session.state(), SessionState::Idle);
    session.open(&LanguageConfig::default(), results_tx).await.unwrap();
    assert_eq!(session.state(), SessionState::Active);

    assert!(session.push_frame(&frame()));

    let mut link = backend.take_link();
    let bytes = link.frames.recv().await.unwrap();
    assert_eq!(bytes, frame().to_le_bytes());
}

#[tokio::test]
async fn frames_are_rejected_when_not_open() {
    let (mut session, _backend) = session_with(vec![], RecognitionSessionConfig::default());
    assert!(!session.push_frame(&frame()));
}

#[tokio::test]
async fn second_open_fails_with_already_open() {
    let (mut session, _backend) = session_with(
        vec![OpenScript::Succeed, OpenScript::Succeed],
        RecognitionSessionConfig::default(),
    );
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    session
        .open(&LanguageConfig::default(), results_tx.clone())
        .await
        .unwrap();
    let err = session.open(&LanguageConfig::default(), results_tx).await;
    assert!(matches!(err, Err(RecognitionError::AlreadyOpen(_))));
    // Still usable
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn failed_open_returns_to_idle() {
    let (mut session, _backend) = session_with(
        vec![OpenScript::Fail(RecognitionError::Connectivity(
            "connection refused".to_string(),
        ))],
        RecognitionSessionConfig::default(),
    );
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    let err = session.open(&LanguageConfig::default(), results_tx).await;
    assert!(matches!(err, Err(RecognitionError::Connectivity(_))));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn open_is_bounded_by_the_configured_timeout() {
    let (mut session, _backend) = session_with(
        vec![OpenScript::Hang],
        RecognitionSessionConfig {
            open_timeout_ms: 50,
            ..RecognitionSessionConfig::default()
        },
    );
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    let err = session.open(&LanguageConfig::default(), results_tx).await;
    assert!(matches!(err, Err(RecognitionError::OpenTimeout(_))));
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn events_are_forwarded_tagged_with_the_source() {
    let (mut session, backend) =
        session_with(vec![OpenScript::Succeed], RecognitionSessionConfig::default());
    let (results_tx, mut results_rx) = mpsc::channel::<ResultMessage>(16);

    session.open(&LanguageConfig::default(), results_tx).await.unwrap();
    let link = backend.take_link();

    link.events
        .send(RecognitionEvent::Final {
            text: "hello".to_string(),
            confidence: 0.9,
            timestamp_ms: 1200,
        })
        .await
        .unwrap();

    let msg = results_rx.recv().await.unwrap();
    assert_eq!(msg.source, StreamSource::Microphone);
    assert!(matches!(
        msg.event,
        RecognitionEvent::Final { ref text, .. } if text == "hello"
    ));
}

#[tokio::test]
async fn close_signals_end_of_audio() {
    let (mut session, backend) =
        session_with(vec![OpenScript::Succeed], RecognitionSessionConfig::default());
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    session.open(&LanguageConfig::default(), results_tx).await.unwrap();
    let mut link = backend.take_link();

    session.close();
    assert_eq!(session.state(), SessionState::Idle);
    // The server side observes the frame channel closing
    assert!(link.frames.recv().await.is_none());

    session.finish(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn finals_sent_after_close_still_reach_the_results_channel() {
    let (mut session, backend) =
        session_with(vec![OpenScript::Succeed], RecognitionSessionConfig::default());
    let (results_tx, mut results_rx) = mpsc::channel::<ResultMessage>(16);

    session.open(&LanguageConfig::default(), results_tx).await.unwrap();
    let link = backend.take_link();

    session.close();
    // Flush-style final arriving after end-of-audio
    link.events
        .send(RecognitionEvent::Final {
            text: "late final".to_string(),
            confidence: 0.8,
            timestamp_ms: 9000,
        })
        .await
        .unwrap();

    let msg = results_rx.recv().await.unwrap();
    assert!(matches!(
        msg.event,
        RecognitionEvent::Final { ref text, .. } if text == "late final"
    ));

    session.finish(Duration::from_millis(200)).await;
}

#[tokio::test(start_paused = true)]
async fn reopen_retries_with_backoff_until_success() {
    let (mut session, backend) = session_with(
        vec![
            OpenScript::Fail(RecognitionError::Connectivity("down".to_string())),
            OpenScript::Fail(RecognitionError::Connectivity("still down".to_string())),
            OpenScript::Succeed,
        ],
        RecognitionSessionConfig {
            max_reopen_attempts: 3,
            reopen_backoff_ms: 100,
            ..RecognitionSessionConfig::default()
        },
    );
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    session
        .reopen_with_backoff(&LanguageConfig::default(), results_tx)
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(backend.open_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn reopen_gives_up_after_max_attempts() {
    let (mut session, backend) = session_with(
        vec![
            OpenScript::Fail(RecognitionError::Connectivity("down".to_string())),
            OpenScript::Fail(RecognitionError::Connectivity("down".to_string())),
        ],
        RecognitionSessionConfig {
            max_reopen_attempts: 2,
            reopen_backoff_ms: 100,
            ..RecognitionSessionConfig::default()
        },
    );
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    let err = session
        .reopen_with_backoff(&LanguageConfig::default(), results_tx)
        .await;
    assert!(matches!(err, Err(RecognitionError::Connectivity(_))));
    assert_eq!(backend.open_count(), 2);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn authentication_failure_is_never_retried() {
    let (mut session, backend) = session_with(
        vec![
            OpenScript::Fail(RecognitionError::Authentication(
                "invalid credentials".to_string(),
            )),
            OpenScript::Succeed,
        ],
        RecognitionSessionConfig {
            max_reopen_attempts: 5,
            reopen_backoff_ms: 100,
            ..RecognitionSessionConfig::default()
        },
    );
    let (results_tx, _results_rx) = mpsc::channel::<ResultMessage>(16);

    let err = session
        .reopen_with_backoff(&LanguageConfig::default(), results_tx)
        .await;
    assert!(matches!(err, Err(RecognitionError::Authentication(_))));
    assert_eq!(backend.open_count(), 1);
}
