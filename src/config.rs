use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::orchestrator::OrchestratorConfig;
use crate::recognition::{LanguageConfig, RecognitionSessionConfig};
use crate::transcript::DedupConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub recognition: RecognitionConfig,
    pub dedup: DedupConfig,
    pub persistence: PersistenceConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "dualscribe".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device id for the microphone; None = host default
    pub microphone_device: Option<String>,
    /// Loopback/monitor device id carrying system audio (e.g. a
    /// PulseAudio monitor or BlackHole on macOS). Required for the
    /// system stream.
    pub system_device: Option<String>,
    /// Bounded capture queue depth, in frames
    pub frame_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            microphone_device: None,
            system_device: None,
            frame_queue_depth: crate::audio::DEFAULT_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// NATS server carrying the STT service
    pub nats_url: String,
    pub language: LanguageConfig,
    pub session: RecognitionSessionConfig,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            language: LanguageConfig::default(),
            session: RecognitionSessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub sessions_dir: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            sessions_dir: "sessions".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from `path` when a matching file exists, otherwise fall
    /// back to defaults so the service runs without any config file.
    pub fn load_or_default(path: &str) -> Result<Self> {
        let exists = ["", ".toml", ".json", ".yaml"]
            .iter()
            .any(|ext| Path::new(&format!("{}{}", path, ext)).exists());
        if exists {
            Self::load(path)
        } else {
            info!("No config file at {}, using defaults", path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let cfg = Config::default();
        assert_eq!(cfg.service.http.port, 8787);
        assert_eq!(cfg.dedup.similarity_threshold, 0.8);
        assert_eq!(cfg.dedup.duplicate_time_window_ms, 3000);
        assert_eq!(cfg.recognition.language.sample_rate, 16000);
    }
}
