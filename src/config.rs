use anyhow::{Context, Result};
use serde::Deserialize;

use crate::live::client::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_VOICE};

pub const DEFAULT_CONFIG_PATH: &str = "config/meld-voice";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub live: LiveSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_channels: u16,
    pub frame_size: usize,
    pub input_device: Option<String>,
    pub playback_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LiveSettings {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: Option<String>,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub connect_timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Config {
    /// Load defaults, then `path` (any extension, optional), then
    /// `MELD_VOICE__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("service.name", "meld-voice")?
            .set_default("service.http.bind", "127.0.0.1")?
            .set_default("service.http.port", 3030)?
            .set_default("audio.input_sample_rate", 16000)?
            .set_default("audio.output_sample_rate", 24000)?
            .set_default("audio.output_channels", 1)?
            .set_default("audio.frame_size", 4096)?
            .set_default("audio.playback_enabled", true)?
            .set_default("live.endpoint", DEFAULT_ENDPOINT)?
            .set_default("live.model", DEFAULT_MODEL)?
            .set_default("live.voice", DEFAULT_VOICE)?
            .set_default("live.input_transcription", true)?
            .set_default("live.output_transcription", true)?
            .set_default("live.connect_timeout_secs", 15)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MELD_VOICE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        let mut cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;

        if cfg.live.api_key.as_deref().map_or(true, str::is_empty) {
            cfg.live.api_key = std::env::var("GEMINI_API_KEY")
                .or_else(|_| std::env::var("API_KEY"))
                .ok()
                .filter(|key| !key.is_empty());
        }

        Ok(cfg)
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.service.http.bind, self.service.http.port)
    }
}
