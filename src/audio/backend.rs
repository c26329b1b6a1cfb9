use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::Result;

/// Block of captured audio (f32, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized samples in [-1, 1], interleaved by channel
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of this block in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Preferred device name (None = system default)
    pub device: Option<String>,
    /// Size of the block queue between the device callback and the pipeline.
    /// Blocks are dropped, not buffered, once it is full.
    pub queue_depth: usize,
    /// Block length for file playback in milliseconds
    pub block_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            device: None,
            queue_depth: 4,
            block_duration_ms: 100,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal input stream
/// - File: WAV file paced in real time (headless runs and tests)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Acquire the device and start capturing
    ///
    /// Suspends while the device is being opened. Returns a channel
    /// receiver that will receive audio blocks.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the device. Calling it twice is harmless.
    fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(source: &AudioSource, config: AudioBackendConfig) -> Box<dyn AudioBackend> {
        match source {
            AudioSource::Microphone => Box::new(super::microphone::MicrophoneBackend::new(config)),
            AudioSource::File(path) => {
                Box::new(super::file::WavFileBackend::new(path.clone(), config))
            }
        }
    }
}

/// Where captured audio comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Microphone input (default or configured device)
    Microphone,
    /// WAV file input
    File(PathBuf),
}
