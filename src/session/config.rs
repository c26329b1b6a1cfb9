use std::path::PathBuf;
use std::time::Duration;

use crate::audio::capture::CaptureSettings;
use crate::config::Config;
use crate::live::client::LiveConfig;

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Frame shape sent upstream (16 kHz, 4096 samples)
    pub capture: CaptureSettings,

    /// Sample rate assumed for inbound audio whose mime type carries none
    pub output_sample_rate: u32,

    /// Channel count of inbound audio
    pub output_channels: u16,

    /// Named input device; `None` uses the system default
    pub input_device: Option<String>,

    /// Stream this WAV file instead of the microphone
    pub input_file: Option<PathBuf>,

    /// Play model audio on the speakers; when false, playback only keeps time
    pub playback_enabled: bool,

    pub live: LiveConfig,
}

impl SessionConfig {
    pub fn input_mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.capture.sample_rate)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            output_sample_rate: 24000,
            output_channels: 1,
            input_device: None,
            input_file: None,
            playback_enabled: true,
            live: LiveConfig::default(),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            capture: CaptureSettings {
                sample_rate: cfg.audio.input_sample_rate,
                frame_size: cfg.audio.frame_size,
            },
            output_sample_rate: cfg.audio.output_sample_rate,
            output_channels: cfg.audio.output_channels,
            input_device: cfg.audio.input_device.clone(),
            input_file: None,
            playback_enabled: cfg.audio.playback_enabled,
            live: LiveConfig {
                endpoint: cfg.live.endpoint.clone(),
                model: cfg.live.model.clone(),
                voice: cfg.live.voice.clone(),
                system_instruction: cfg.live.system_instruction.clone(),
                input_transcription: cfg.live.input_transcription,
                output_transcription: cfg.live.output_transcription,
                connect_timeout: Duration::from_secs(cfg.live.connect_timeout_secs),
                api_key: cfg.live.api_key.clone(),
            },
        }
    }
}
