//! Real input devices via cpal.
//!
//! The cpal stream is `!Send`, so it lives on a dedicated OS thread for
//! the lifetime of the capture; the data callback hands frames off over
//! a bounded channel and never blocks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::error::CaptureError;

use super::backend::{AudioBackend, RawAudioFrame, SampleData, StreamSource};

const FRAME_CHANNEL_DEPTH: usize = 256;

pub struct CpalBackend {
    source: StreamSource,
    device_id: Option<String>,
    capturing: Arc<AtomicBool>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl CpalBackend {
    pub fn new(source: StreamSource, device_id: Option<String>) -> Self {
        Self {
            source,
            device_id,
            capturing: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            worker: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for CpalBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<RawAudioFrame>, CaptureError> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(CaptureError::Acquisition(format!(
                "cpal backend for {:?} already capturing",
                self.source
            )));
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let source = self.source;
        let device_id = self.device_id.clone();
        let capturing = Arc::clone(&self.capturing);

        let worker = std::thread::Builder::new()
            .name(format!("audio-{}", source.stream_id()))
            .spawn(move || match build_stream(source, device_id.as_deref(), frame_tx) {
                Ok(stream) => {
                    if ready_tx.send(Ok(())).is_err() {
                        return;
                    }
                    capturing.store(true, Ordering::SeqCst);
                    // Park until stop() drops its sender
                    let _ = stop_rx.recv();
                    drop(stream);
                    capturing.store(false, Ordering::SeqCst);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| {
                CaptureError::Acquisition(format!("failed to spawn audio thread: {}", e))
            })?;

        self.worker = Some(worker);
        self.stop_tx = Some(stop_tx);

        match ready_rx.await {
            Ok(Ok(())) => {
                info!("cpal capture started for {:?}", source);
                Ok(frame_rx)
            }
            Ok(Err(e)) => {
                self.stop_tx = None;
                self.worker = None;
                Err(e)
            }
            Err(_) => {
                self.stop_tx = None;
                self.worker = None;
                Err(CaptureError::Acquisition(
                    "audio thread exited during startup".to_string(),
                ))
            }
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        // Dropping the sender unparks the worker
        self.stop_tx = None;
        if let Some(worker) = self.worker.take() {
            let joined = tokio::task::spawn_blocking(move || worker.join()).await;
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!("Audio thread for {:?} panicked", self.source),
                Err(e) => warn!("Failed to join audio thread for {:?}: {}", self.source, e),
            }
        }
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "cpal"
    }
}

fn build_stream(
    source: StreamSource,
    device_id: Option<&str>,
    frame_tx: mpsc::Sender<RawAudioFrame>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();

    let device = match device_id {
        Some(id) => host
            .input_devices()
            .map_err(|e| CaptureError::Acquisition(format!("failed to list input devices: {}", e)))?
            .find(|d| d.name().map(|n| n == id).unwrap_or(false))
            .ok_or_else(|| {
                CaptureError::Acquisition(format!("input device '{}' not found", id))
            })?,
        None => host.default_input_device().ok_or_else(|| {
            CaptureError::Acquisition("no default input device available".to_string())
        })?,
    };

    let supported = device.default_input_config().map_err(|e| {
        CaptureError::Acquisition(format!("failed to query input config: {}", e))
    })?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.config();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;

    info!(
        "Opening {:?} input '{}': {} Hz, {} channels, {:?}",
        source,
        device.name().unwrap_or_else(|_| "<unknown>".to_string()),
        sample_rate,
        channels,
        sample_format
    );

    let started = Instant::now();
    let err_fn = move |err: cpal::StreamError| {
        error!("Audio stream error on {:?}: {}", source, err);
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let frame = RawAudioFrame {
                        source,
                        samples: SampleData::F32(data.to_vec()),
                        sample_rate,
                        channels,
                        timestamp_ms: started.elapsed().as_millis() as u64,
                    };
                    // Never block the audio thread; downstream saturation
                    // is handled by the capture queue's drop policy
                    let _ = frame_tx.try_send(frame);
                },
                err_fn,
                None,
            )
            .map_err(|e| CaptureError::Acquisition(format!("failed to build input stream: {}", e)))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let frame = RawAudioFrame {
                        source,
                        samples: SampleData::I16(data.to_vec()),
                        sample_rate,
                        channels,
                        timestamp_ms: started.elapsed().as_millis() as u64,
                    };
                    let _ = frame_tx.try_send(frame);
                },
                err_fn,
                None,
            )
            .map_err(|e| CaptureError::Acquisition(format!("failed to build input stream: {}", e)))?,
        other => {
            return Err(CaptureError::UnsupportedFormat(format!(
                "unsupported device sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| CaptureError::Acquisition(format!("failed to start input stream: {}", e)))?;

    Ok(stream)
}
