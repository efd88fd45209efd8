//! Streaming recognition: the backend boundary to the external
//! recognizer, the NATS transport, and the per-stream session state
//! machine.

pub mod backend;
pub mod nats;
pub mod session;

pub use backend::{
    LanguageConfig, RecognitionBackend, RecognitionErrorKind, RecognitionEvent, RecognitionHandle,
};
pub use nats::NatsRecognitionBackend;
pub use session::{RecognitionSessionConfig, SessionState, StreamingRecognitionSession};
