//! One capture pipeline per physical source: backend frames are
//! normalized to canonical PCM and handed off through a thread-safe
//! bounded queue that never blocks the producing side.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::CaptureError;
use crate::events::{EngineEvent, EventSender};

use super::backend::{AudioBackend, AudioFrame, StreamSource};
use super::convert;

/// Default queue depth: ~6.4 s of audio at 100 ms frames.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Bound on waiting for the normalize pump to drain at release.
const PUMP_DRAIN: Duration = Duration::from_millis(500);

/// Thread-safe bounded frame queue with drop-oldest overflow.
///
/// `push` is synchronous and non-blocking so it can be called from a
/// platform audio callback thread; a slow consumer costs the oldest
/// buffered frames, counted and logged, never a stalled producer.
pub struct FrameQueue {
    inner: Mutex<VecDeque<AudioFrame>>,
    notify: Notify,
    max_depth: usize,
    dropped: AtomicU64,
}

impl FrameQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(max_depth)),
            notify: Notify::new(),
            max_depth: max_depth.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame, evicting the oldest one when full.
    pub fn push(&self, frame: AudioFrame) {
        {
            let mut queue = self.inner.lock().expect("frame queue poisoned");
            if queue.len() >= self.max_depth {
                queue.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % 100 == 1 {
                    warn!(
                        "Frame queue full ({} deep), dropped oldest frame ({} total)",
                        self.max_depth, dropped
                    );
                }
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
    }

    /// Dequeue the oldest frame without waiting.
    pub fn try_pop(&self) -> Option<AudioFrame> {
        self.inner.lock().expect("frame queue poisoned").pop_front()
    }

    /// Dequeue the oldest frame, waiting until one is available.
    pub async fn pop(&self) -> AudioFrame {
        loop {
            if let Some(frame) = self.try_pop() {
                return frame;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("frame queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total frames discarded due to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Acquires continuous audio from one physical source and emits
/// normalized frames in strict arrival order.
pub struct AudioSourceCapture {
    source: StreamSource,
    backend: Box<dyn AudioBackend>,
    queue: Arc<FrameQueue>,
    events: EventSender,
    pump: Option<JoinHandle<()>>,
    active: bool,
}

impl AudioSourceCapture {
    pub fn new(
        source: StreamSource,
        backend: Box<dyn AudioBackend>,
        queue_depth: usize,
        events: EventSender,
    ) -> Self {
        Self {
            source,
            backend,
            queue: Arc::new(FrameQueue::new(queue_depth)),
            events,
            pump: None,
            active: false,
        }
    }

    /// Open the device/stream and start pumping frames.
    ///
    /// Idempotent: a second call while active is a no-op.
    pub async fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.active {
            debug!("Capture for {:?} already active, ignoring acquire", self.source);
            return Ok(());
        }

        info!("Acquiring audio source {:?} via {}", self.source, self.backend.name());

        let mut raw_rx = self.backend.start().await?;

        let queue = Arc::clone(&self.queue);
        let source = self.source;
        self.pump = Some(tokio::spawn(async move {
            let mut format_warned = false;
            while let Some(raw) = raw_rx.recv().await {
                match convert::normalize(raw) {
                    Ok(frame) => queue.push(frame),
                    Err(e) => {
                        if !format_warned {
                            error!("Dropping unconvertible frames from {:?}: {}", source, e);
                            format_warned = true;
                        }
                    }
                }
            }
            debug!("Frame pump for {:?} finished", source);
        }));

        self.active = true;
        let _ = self.events.send(EngineEvent::SourceActive { source: self.source });
        Ok(())
    }

    /// Stop the stream. Safe to call repeatedly; never fails from the
    /// caller's perspective, cleanup is best-effort.
    pub async fn release(&mut self) {
        if !self.active {
            return;
        }

        info!("Releasing audio source {:?}", self.source);

        if let Err(e) = self.backend.stop().await {
            warn!("Backend stop for {:?} failed: {}", self.source, e);
        }

        // A backend that keeps its frame sender alive must not stall
        // release; the pump join is bounded like every other teardown.
        if let Some(mut pump) = self.pump.take() {
            match timeout(PUMP_DRAIN, &mut pump).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Frame pump for {:?} panicked: {}", self.source, e),
                Err(_) => {
                    warn!(
                        "Frame pump for {:?} did not drain within {:?}, aborting",
                        self.source, PUMP_DRAIN
                    );
                    pump.abort();
                }
            }
        }

        self.active = false;
        let _ = self
            .events
            .send(EngineEvent::SourceInactive { source: self.source });
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Shared handle to the output queue for downstream routing.
    pub fn queue(&self) -> Arc<FrameQueue> {
        Arc::clone(&self.queue)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.queue.dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp_ms: u64) -> AudioFrame {
        AudioFrame {
            source: StreamSource::Microphone,
            pcm: vec![0; 160],
            timestamp_ms,
        }
    }

    #[tokio::test]
    async fn queue_preserves_arrival_order() {
        let queue = FrameQueue::new(8);
        for ts in 0..5 {
            queue.push(frame(ts));
        }
        for ts in 0..5 {
            assert_eq!(queue.pop().await.timestamp_ms, ts);
        }
    }

    #[test]
    fn queue_drops_oldest_on_overflow() {
        let queue = FrameQueue::new(3);
        for ts in 0..5 {
            queue.push(frame(ts));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 2);
        // Oldest two (0 and 1) were evicted
        assert_eq!(queue.try_pop().unwrap().timestamp_ms, 2);
        assert_eq!(queue.try_pop().unwrap().timestamp_ms, 3);
        assert_eq!(queue.try_pop().unwrap().timestamp_ms, 4);
        assert!(queue.try_pop().is_none());
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = Arc::new(FrameQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await.timestamp_ms })
        };
        tokio::task::yield_now().await;
        queue.push(frame(7));
        assert_eq!(consumer.await.unwrap(), 7);
    }
}
