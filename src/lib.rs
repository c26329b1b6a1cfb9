pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod playback;
pub mod session;

pub use audio::{
    decode_frame, encode_frame, AudioBackend, AudioBackendConfig, AudioBackendFactory,
    AudioBuffer, AudioFile, AudioFrame, AudioSource, CaptureHandle, CapturePipeline,
    CaptureSettings, EncodedPayload,
};
pub use config::Config;
pub use error::{Result, VoiceError};
pub use http::{create_router, AppState};
pub use live::{InboundMessage, LiveConfig, LiveTransport, SessionHandle, TransportEvent};
pub use playback::{AudioOutput, PlaybackScheduler, ScheduledUnit, UnitId};
pub use session::{
    DeviceProvider, SessionConfig, SessionController, SessionState, SessionStats, SessionView,
    Speaker, TranscriptAssembler, TranscriptEntry,
};
