use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

/// One committed line of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    pub committed_at: DateTime<Utc>,
}

/// Builds transcript entries out of streamed transcription fragments
///
/// Fragments are concatenated as received. A turn commits the user's words
/// first, then the model's.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    user: String,
    model: String,
    entries: Vec<TranscriptEntry>,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_input(&mut self, text: &str) {
        self.user.push_str(text);
    }

    pub fn append_output(&mut self, text: &str) {
        self.model.push_str(text);
    }

    /// Close the current turn and return the entries it produced
    pub fn commit_turn(&mut self) -> Vec<TranscriptEntry> {
        let committed_at = Utc::now();
        let mut committed = Vec::new();

        for (speaker, pending) in [
            (Speaker::User, std::mem::take(&mut self.user)),
            (Speaker::Model, std::mem::take(&mut self.model)),
        ] {
            if !pending.is_empty() {
                committed.push(TranscriptEntry {
                    speaker,
                    text: pending,
                    committed_at,
                });
            }
        }

        self.entries.extend(committed.iter().cloned());
        committed
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn pending_input(&self) -> &str {
        &self.user
    }

    pub fn pending_output(&self) -> &str {
        &self.model
    }
}
