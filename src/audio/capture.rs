//! Capture pipeline
//!
//! Drives a capture backend, turns its blocks into fixed-size 16 kHz mono
//! frames and hands each encoded frame to a callback as soon as it is
//! complete.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::AudioBackend;
use super::codec::{encode_frame, EncodedPayload};
use super::resample::Framer;
use crate::error::Result;

/// Frame shape sent to the live channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Samples per frame
    pub frame_size: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 4096,
        }
    }
}

pub struct CapturePipeline;

impl CapturePipeline {
    /// Acquire the backend's device and start pumping frames into `on_frame`
    ///
    /// Suspends until the device is open. Device failures are returned as-is
    /// (`PermissionDenied` / `DeviceUnavailable`) and never retried.
    pub async fn start<F>(
        mut backend: Box<dyn AudioBackend>,
        settings: CaptureSettings,
        on_frame: F,
    ) -> Result<CaptureHandle>
    where
        F: Fn(EncodedPayload) + Send + Sync + 'static,
    {
        let mut blocks = backend.start().await?;
        info!(
            "Capture started on {} ({} Hz frames of {} samples)",
            backend.name(),
            settings.sample_rate,
            settings.frame_size
        );

        let frames_emitted = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&frames_emitted);
        let pump = tokio::spawn(async move {
            let mut framer = Framer::new(settings.sample_rate, settings.frame_size);
            while let Some(block) = blocks.recv().await {
                for frame in framer.push(&block.samples, block.sample_rate, block.channels) {
                    on_frame(encode_frame(&frame));
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }
            debug!("Capture block stream ended");
        });

        Ok(CaptureHandle {
            backend,
            pump: Some(pump),
            frames_emitted,
        })
    }
}

/// A running capture pipeline
pub struct CaptureHandle {
    backend: Box<dyn AudioBackend>,
    pump: Option<JoinHandle<()>>,
    frames_emitted: Arc<AtomicU64>,
}

impl CaptureHandle {
    /// Disconnect the pump and release the device. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            info!(
                "Capture stopped on {} after {} frames",
                self.backend.name(),
                self.frames_emitted()
            );
        }
        self.backend.stop()
    }

    pub fn is_running(&self) -> bool {
        self.pump.is_some()
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop capture on drop: {}", e);
        }
    }
}
