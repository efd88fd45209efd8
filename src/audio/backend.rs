use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::CaptureError;

/// Logical audio stream identity. The source set is fixed at design time,
/// so downstream code matches exhaustively instead of keying by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    /// Microphone input (the local participant)
    Microphone,
    /// System/loopback audio (everyone else on the call)
    SystemAudio,
}

impl StreamSource {
    /// Fixed, total mapping from stream identity to speaker label.
    pub fn speaker_label(self) -> &'static str {
        match self {
            StreamSource::Microphone => "You",
            StreamSource::SystemAudio => "Other",
        }
    }

    /// Stable wire identifier used on recognition subjects.
    pub fn stream_id(self) -> &'static str {
        match self {
            StreamSource::Microphone => "mic",
            StreamSource::SystemAudio => "system",
        }
    }

    pub fn all() -> [StreamSource; 2] {
        [StreamSource::Microphone, StreamSource::SystemAudio]
    }
}

/// One value per stream source, with exhaustive access by source.
#[derive(Debug, Clone, Default)]
pub struct PerStream<T> {
    pub microphone: T,
    pub system: T,
}

impl<T> PerStream<T> {
    pub fn get(&self, source: StreamSource) -> &T {
        match source {
            StreamSource::Microphone => &self.microphone,
            StreamSource::SystemAudio => &self.system,
        }
    }

    pub fn get_mut(&mut self, source: StreamSource) -> &mut T {
        match source {
            StreamSource::Microphone => &mut self.microphone,
            StreamSource::SystemAudio => &mut self.system,
        }
    }
}

/// Sample payload of a raw frame, as delivered by a backend.
#[derive(Debug, Clone)]
pub enum SampleData {
    I16(Vec<i16>),
    F32(Vec<f32>),
}

impl SampleData {
    pub fn len(&self) -> usize {
        match self {
            SampleData::I16(v) => v.len(),
            SampleData::F32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Audio as produced by a capture backend, before normalization.
#[derive(Debug, Clone)]
pub struct RawAudioFrame {
    pub source: StreamSource,
    /// Interleaved samples
    pub samples: SampleData,
    pub sample_rate: u32,
    pub channels: u16,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Canonical PCM frame: 16 kHz, mono, 16-bit signed. Ephemeral.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub source: StreamSource,
    pub pcm: Vec<i16>,
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Little-endian byte view for the recognizer wire contract.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.pcm.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - `CpalBackend`: real input devices (microphone, loopback/monitor devices)
/// - `WavFileBackend`: read from a WAV file (for testing/batch processing)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive raw audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<RawAudioFrame>, CaptureError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// How to open one physical audio source.
#[derive(Debug, Clone)]
pub enum SourceSpec {
    /// A real input device. `device_id` of `None` means the host default;
    /// system audio always needs an explicit loopback/monitor device id.
    Device {
        source: StreamSource,
        device_id: Option<String>,
    },
    /// A WAV file played back as if captured live.
    File {
        source: StreamSource,
        path: PathBuf,
        realtime: bool,
    },
}

impl SourceSpec {
    pub fn source(&self) -> StreamSource {
        match self {
            SourceSpec::Device { source, .. } => *source,
            SourceSpec::File { source, .. } => *source,
        }
    }
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for one source spec
    pub fn create(spec: &SourceSpec) -> Result<Box<dyn AudioBackend>, CaptureError> {
        match spec {
            SourceSpec::Device { source, device_id } => {
                if *source == StreamSource::SystemAudio && device_id.is_none() {
                    return Err(CaptureError::Acquisition(
                        "system audio capture needs a configured loopback/monitor device id"
                            .to_string(),
                    ));
                }
                let backend = super::device::CpalBackend::new(*source, device_id.clone());
                Ok(Box::new(backend))
            }
            SourceSpec::File {
                source,
                path,
                realtime,
            } => {
                let backend = super::file::WavFileBackend::new(*source, path.clone(), *realtime);
                Ok(Box::new(backend))
            }
        }
    }
}

/// A physical audio device visible to the host.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Input,
    Output,
}

/// List audio devices on the default host. Devices that fail to report a
/// name are skipped with a warning rather than failing the whole listing.
pub fn enumerate_devices() -> Vec<DeviceInfo> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    match host.input_devices() {
        Ok(inputs) => {
            for device in inputs {
                match device.name() {
                    Ok(name) => devices.push(DeviceInfo {
                        id: name.clone(),
                        label: name,
                        kind: DeviceKind::Input,
                    }),
                    Err(e) => warn!("Skipping unnamed input device: {}", e),
                }
            }
        }
        Err(e) => warn!("Failed to enumerate input devices: {}", e),
    }

    match host.output_devices() {
        Ok(outputs) => {
            for device in outputs {
                match device.name() {
                    Ok(name) => devices.push(DeviceInfo {
                        id: name.clone(),
                        label: name,
                        kind: DeviceKind::Output,
                    }),
                    Err(e) => warn!("Skipping unnamed output device: {}", e),
                }
            }
        }
        Err(e) => warn!("Failed to enumerate output devices: {}", e),
    }

    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_labels_are_fixed_and_total() {
        assert_eq!(StreamSource::Microphone.speaker_label(), "You");
        assert_eq!(StreamSource::SystemAudio.speaker_label(), "Other");
    }

    #[test]
    fn frame_bytes_are_little_endian() {
        let frame = AudioFrame {
            source: StreamSource::Microphone,
            pcm: vec![0x0102, -1],
            timestamp_ms: 0,
        };
        assert_eq!(frame.to_le_bytes(), vec![0x02, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn system_audio_device_requires_explicit_id() {
        let spec = SourceSpec::Device {
            source: StreamSource::SystemAudio,
            device_id: None,
        };
        assert!(matches!(
            AudioBackendFactory::create(&spec),
            Err(CaptureError::Acquisition(_))
        ));
    }
}
