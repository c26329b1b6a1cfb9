//! Voice session management
//!
//! `SessionController` runs one conversation at a time: it opens the live
//! channel, the microphone pipeline and the playback scheduler, routes
//! inbound model events to playback and the transcript, and tears the whole
//! set down on stop, on error, or when the remote hangs up.

mod config;
mod controller;
mod resources;
mod state;
mod stats;
mod transcript;

pub use config::SessionConfig;
pub use controller::{
    DeviceProvider, SessionController, SessionView, SystemDevices, STATUS_CONNECTING,
    STATUS_ENDED, STATUS_IDLE, STATUS_LISTENING, STATUS_MICROPHONE,
};
pub use resources::LiveSession;
pub use state::SessionState;
pub use stats::SessionStats;
pub use transcript::{Speaker, TranscriptAssembler, TranscriptEntry};
