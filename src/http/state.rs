use std::sync::Arc;
use tokio::sync::Mutex;

use crate::orchestrator::SessionOrchestrator;
use crate::transcript::TranscriptEngine;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub engine: Arc<Mutex<TranscriptEngine>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<SessionOrchestrator>,
        engine: Arc<Mutex<TranscriptEngine>>,
    ) -> Self {
        Self {
            orchestrator,
            engine,
        }
    }
}
