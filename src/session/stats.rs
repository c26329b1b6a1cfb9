use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::SessionState;

/// Statistics about the current or most recent voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub state: SessionState,

    /// Present once a session has been started
    pub session_id: Option<String>,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds from start until now, or until teardown
    pub duration_secs: f64,

    /// Microphone frames handed to the live channel
    pub frames_sent: u64,

    /// Model audio chunks scheduled for playback
    pub audio_chunks_played: u64,

    /// Model audio chunks dropped because they failed to decode
    pub audio_chunks_dropped: u64,

    /// Committed transcript entries
    pub transcript_entries: usize,
}
