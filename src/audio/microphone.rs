// Microphone capture backend built on cpal
//
// The device is opened lazily in `start()`, which is where the platform
// asks for microphone permission. Blocks are pushed from the cpal callback
// thread into a small bounded channel; when the pipeline falls behind the
// callback drops blocks instead of queueing them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{Result, VoiceError};

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: owners keep the stream behind a Mutex or exclusive `&mut` access
/// and only ever drop it; it is never used from two threads at once.
pub(crate) struct SendableStream(#[allow(dead_code)] pub(crate) cpal::Stream);

unsafe impl Send for SendableStream {}

/// Map a cpal error message onto the capture error taxonomy
pub(crate) fn classify_device_error(message: String) -> VoiceError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        VoiceError::PermissionDenied(message)
    } else {
        VoiceError::DeviceUnavailable(message)
    }
}

/// List the names of available input devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|d| d.name().ok())
        .unwrap_or_default();

    let devices = host
        .input_devices()
        .map_err(|e| VoiceError::DeviceUnavailable(format!("Failed to enumerate input devices: {}", e)))?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if name == default_name {
                names.push(format!("{} [default]", name));
            } else {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Microphone backend
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    stream: Mutex<Option<SendableStream>>,
    capturing: Arc<AtomicBool>,
    dropped_blocks: Arc<AtomicU64>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            stream: Mutex::new(None),
            capturing: Arc::new(AtomicBool::new(false)),
            dropped_blocks: Arc::new(AtomicU64::new(0)),
        }
    }

    fn open_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();

        match &self.config.device {
            Some(name) => {
                let devices = host.input_devices().map_err(|e| {
                    VoiceError::DeviceUnavailable(format!("Failed to enumerate devices: {}", e))
                })?;
                for device in devices {
                    if device.name().map(|n| &n == name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(VoiceError::DeviceUnavailable(format!(
                    "Input device not found: {}",
                    name
                )))
            }
            None => host
                .default_input_device()
                .ok_or_else(|| VoiceError::DeviceUnavailable("No input device available".to_string())),
        }
    }

    fn build_stream<T, F>(
        &self,
        device: &cpal::Device,
        config: &StreamConfig,
        tx: mpsc::Sender<AudioFrame>,
        convert: F,
    ) -> Result<cpal::Stream>
    where
        T: SizedSample,
        F: Fn(T) -> f32 + Send + 'static,
    {
        let capturing = Arc::clone(&self.capturing);
        let dropped = Arc::clone(&self.dropped_blocks);
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;
        let samples_per_second = sample_rate as u64 * channels as u64;
        let mut samples_seen: u64 = 0;

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if !capturing.load(Ordering::Relaxed) {
                        return;
                    }
                    let frame = AudioFrame {
                        samples: data.iter().map(|&s| convert(s)).collect(),
                        sample_rate,
                        channels,
                        timestamp_ms: samples_seen * 1000 / samples_per_second.max(1),
                    };
                    samples_seen += data.len() as u64;
                    if tx.try_send(frame).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                },
                |err| error!("Audio input stream error: {}", err),
                None,
            )
            .map_err(|e| classify_device_error(e.to_string()))
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            warn!("Microphone already capturing");
            return Err(VoiceError::DeviceUnavailable(
                "microphone already in use by this session".to_string(),
            ));
        }

        let device = self.open_device()?;
        let supported = device
            .default_input_config()
            .map_err(|e| classify_device_error(e.to_string()))?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        info!(
            "Opening microphone {} ({}Hz, {} channels, {:?})",
            device.name().unwrap_or_default(),
            stream_config.sample_rate.0,
            stream_config.channels,
            sample_format
        );

        let (tx, rx) = mpsc::channel(self.config.queue_depth.max(1));
        let stream = match sample_format {
            SampleFormat::F32 => self.build_stream(&device, &stream_config, tx, |s: f32| s)?,
            SampleFormat::I16 => {
                self.build_stream(&device, &stream_config, tx, |s: i16| f32::from(s) / 32768.0)?
            }
            SampleFormat::I32 => self.build_stream(&device, &stream_config, tx, |s: i32| {
                s as f32 / 2_147_483_648.0
            })?,
            other => {
                return Err(VoiceError::DeviceUnavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        };

        self.capturing.store(true, Ordering::SeqCst);
        stream.play().map_err(|e| {
            self.capturing.store(false, Ordering::SeqCst);
            classify_device_error(e.to_string())
        })?;

        let mut slot = self
            .stream
            .lock()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("capture stream lock poisoned: {}", e)))?;
        *slot = Some(SendableStream(stream));

        Ok(rx)
    }

    fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        let stream = self
            .stream
            .lock()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("capture stream lock poisoned: {}", e)))?
            .take();

        if stream.is_some() {
            // Dropping the stream disconnects the callback and releases the device
            drop(stream);
            let dropped = self.dropped_blocks.load(Ordering::Relaxed);
            if dropped > 0 {
                warn!("Microphone dropped {} blocks while the pipeline was busy", dropped);
            }
            info!("Microphone released");
        } else {
            debug!("Microphone already released");
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to release microphone on drop: {}", e);
        }
    }
}
