//! Error types for voice sessions.

use thiserror::Error;

/// Errors raised by the session engine.
///
/// None of these are retried automatically. `MalformedPayload` on a single
/// inbound chunk is survivable; everything else ends the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Malformed audio payload: {0}")]
    MalformedPayload(String),

    /// Reported by the remote model; always terminal.
    #[error("{0}")]
    SessionError(String),

    #[error("A voice session is already active")]
    AlreadyActive,

    #[error("Session start was cancelled")]
    Cancelled,
}

impl VoiceError {
    /// True for failures to acquire the microphone.
    pub fn is_microphone_failure(&self) -> bool {
        matches!(
            self,
            VoiceError::PermissionDenied(_) | VoiceError::DeviceUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VoiceError>;
