//! WAV file playback backend, for deterministic tests and batch
//! re-transcription of saved recordings.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::CaptureError;

use super::backend::{AudioBackend, RawAudioFrame, SampleData, StreamSource};

/// Frame duration emitted by the file backend.
const FRAME_MS: u64 = 100;

pub struct WavFileBackend {
    source: StreamSource,
    path: PathBuf,
    /// When true, frames are paced at real time; otherwise the whole
    /// file is delivered as fast as the consumer drains it.
    realtime: bool,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(source: StreamSource, path: PathBuf, realtime: bool) -> Self {
        Self {
            source,
            path,
            realtime,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<RawAudioFrame>, CaptureError> {
        let path = self.path.clone();
        let (samples, sample_rate, channels) =
            tokio::task::spawn_blocking(move || read_wav(&path))
                .await
                .map_err(|e| CaptureError::Acquisition(format!("WAV reader task failed: {}", e)))??;

        info!(
            "Loaded {}: {} Hz, {} channels, {} samples",
            self.path.display(),
            sample_rate,
            channels,
            samples.len()
        );

        let (tx, rx) = mpsc::channel(64);
        let source = self.source;
        let realtime = self.realtime;
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let samples_per_frame = (sample_rate as u64 * channels as u64 * FRAME_MS / 1000) as usize;

        self.task = Some(tokio::spawn(async move {
            let mut timestamp_ms = 0u64;
            for chunk in chunk_samples(samples, samples_per_frame.max(1)) {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                if realtime {
                    tokio::time::sleep(Duration::from_millis(FRAME_MS)).await;
                }
                let frame = RawAudioFrame {
                    source,
                    samples: chunk,
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += FRAME_MS;
            }
            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

fn read_wav(path: &PathBuf) -> Result<(SampleData, u32, u16), CaptureError> {
    let reader = hound::WavReader::open(path).map_err(|e| {
        CaptureError::Acquisition(format!("failed to open WAV file {}: {}", path.display(), e))
    })?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => {
            let samples: Result<Vec<i16>, _> = reader.into_samples::<i16>().collect();
            SampleData::I16(samples.map_err(|e| {
                CaptureError::Acquisition(format!("failed to read samples: {}", e))
            })?)
        }
        (hound::SampleFormat::Float, 32) => {
            let samples: Result<Vec<f32>, _> = reader.into_samples::<f32>().collect();
            SampleData::F32(samples.map_err(|e| {
                CaptureError::Acquisition(format!("failed to read samples: {}", e))
            })?)
        }
        (format, bits) => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "unsupported WAV encoding: {:?} {} bit",
                format, bits
            )))
        }
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

fn chunk_samples(samples: SampleData, per_frame: usize) -> Vec<SampleData> {
    match samples {
        SampleData::I16(v) => v
            .chunks(per_frame)
            .map(|c| SampleData::I16(c.to_vec()))
            .collect(),
        SampleData::F32(v) => v
            .chunks(per_frame)
            .map(|c| SampleData::F32(c.to_vec()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_preserves_sample_count() {
        let chunks = chunk_samples(SampleData::I16((0..3500).map(|i| i as i16).collect()), 1600);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1600);
        assert_eq!(chunks[2].len(), 300);
    }
}
