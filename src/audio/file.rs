use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{Result, VoiceError};

/// WAV file loaded into memory as normalized samples
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| {
            VoiceError::DeviceUnavailable(format!("Failed to open WAV file {}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        }
        .map_err(|e| VoiceError::DeviceUnavailable(format!("Failed to read audio samples: {}", e)))?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Capture backend that plays a WAV file as if it were a microphone
///
/// Blocks are released at the file's own pace so the remote side sees
/// real-time audio.
pub struct WavFileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable(format!(
                "{} is already being streamed",
                self.path.display()
            )));
        }

        let path = self.path.clone();
        let file = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .map_err(|e| VoiceError::DeviceUnavailable(format!("WAV loader panicked: {}", e)))??;

        let channels = file.channels.max(1) as usize;
        let block_frames =
            ((file.sample_rate as u64 * self.config.block_duration_ms) / 1000).max(1) as usize;
        let block_len = block_frames * channels;
        let block_duration = Duration::from_millis(self.config.block_duration_ms.max(1));

        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(block_duration);
            for (index, block) in file.samples.chunks(block_len).enumerate() {
                ticker.tick().await;
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate: file.sample_rate,
                    channels: file.channels,
                    timestamp_ms: index as u64 * block_duration.as_millis() as u64,
                };
                if tx.try_send(frame).is_err() && tx.is_closed() {
                    break;
                }
            }
            capturing.store(false, Ordering::SeqCst);
            debug!("WAV file stream finished: {}", file.path);
        });

        self.task = Some(task);
        Ok(rx)
    }

    fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            info!("WAV file capture stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav file"
    }
}

impl Drop for WavFileBackend {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
