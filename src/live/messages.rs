use serde::{Deserialize, Serialize};

use crate::audio::codec::EncodedPayload;

/// Session setup sent once after the socket opens
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<EmptyObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<EmptyObject>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Serializes as `{}`
#[derive(Debug, Default, Serialize)]
pub struct EmptyObject {}

impl SetupMessage {
    pub fn new(
        model: &str,
        voice: &str,
        system_instruction: Option<&str>,
        input_transcription: bool,
        output_transcription: bool,
    ) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: voice.to_string(),
                            },
                        },
                    },
                },
                system_instruction: system_instruction
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| Content {
                        parts: vec![TextPart {
                            text: text.to_string(),
                        }],
                    }),
                input_audio_transcription: input_transcription.then(EmptyObject::default),
                output_audio_transcription: output_transcription.then(EmptyObject::default),
            },
        }
    }
}

/// One outbound microphone frame
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: EncodedPayload,
}

impl RealtimeInputMessage {
    pub fn audio(mime_type: &str, data: EncodedPayload) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![Blob {
                    mime_type: mime_type.to_string(),
                    data,
                }],
            },
        }
    }
}

/// Anything the server sends; unknown fields are ignored
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub setup_complete: Option<serde_json::Value>,
    pub server_content: Option<ServerContent>,
    pub error: Option<ServerError>,
    pub go_away: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub inline_data: Option<Blob>,
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerError {
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    pub status: Option<String>,
}

/// Events delivered to the session, one per variant, in receipt order
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    AudioChunk {
        payload: EncodedPayload,
        mime_type: String,
    },
    InputTranscriptDelta {
        text: String,
    },
    OutputTranscriptDelta {
        text: String,
    },
    TurnComplete,
    SessionError {
        message: String,
    },
}

impl ServerMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flatten into session events
    ///
    /// Order within one message: input transcript, output transcript, audio
    /// parts, turn completion.
    pub fn into_inbound(self) -> Vec<InboundMessage> {
        let mut events = Vec::new();

        if let Some(error) = self.error {
            let message = if error.message.is_empty() {
                error
                    .status
                    .unwrap_or_else(|| format!("remote error {}", error.code.unwrap_or_default()))
            } else {
                error.message
            };
            events.push(InboundMessage::SessionError { message });
            return events;
        }

        let Some(content) = self.server_content else {
            return events;
        };

        if let Some(t) = content.input_transcription.filter(|t| !t.text.is_empty()) {
            events.push(InboundMessage::InputTranscriptDelta { text: t.text });
        }
        if let Some(t) = content.output_transcription.filter(|t| !t.text.is_empty()) {
            events.push(InboundMessage::OutputTranscriptDelta { text: t.text });
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    events.push(InboundMessage::AudioChunk {
                        payload: blob.data,
                        mime_type: blob.mime_type,
                    });
                }
            }
        }
        if content.turn_complete {
            events.push(InboundMessage::TurnComplete);
        }

        events
    }
}

/// Read `rate=N` out of a mime type such as `audio/pcm;rate=24000`
pub fn sample_rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .filter(|&rate| rate > 0)
}
