// Gemini Live transport over WebSocket
//
// `open` connects, sends the setup message and waits for `setupComplete`.
// Only then is the handle attached and `Opened` emitted. After that one
// writer task drains the handle's outbound queue and one reader task turns
// server messages into `TransportEvent`s in the order they arrive.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::handle::{OutboundFrame, SessionHandle};
use super::messages::{InboundMessage, RealtimeInputMessage, ServerMessage, SetupMessage};
use crate::error::{Result, VoiceError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";
pub const DEFAULT_VOICE: &str = "Kore";

/// Connection settings for one live session
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: Option<String>,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub connect_timeout: Duration,
    pub api_key: Option<String>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: None,
            input_transcription: true,
            output_transcription: true,
            connect_timeout: Duration::from_secs(15),
            api_key: None,
        }
    }
}

impl LiveConfig {
    /// Endpoint URL with the API key attached
    pub fn url(&self) -> Result<String> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| VoiceError::ConnectionFailed("no API key configured".to_string()))?;
        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}key={}", self.endpoint, separator, key.trim()))
    }

    pub fn setup_message(&self) -> SetupMessage {
        SetupMessage::new(
            &self.model,
            &self.voice,
            self.system_instruction.as_deref(),
            self.input_transcription,
            self.output_transcription,
        )
    }
}

/// What a transport reports back to the session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake finished; frames sent from now on reach the remote
    Opened,
    Message(InboundMessage),
    /// Channel failure. Terminal.
    Error(VoiceError),
    /// Remote hung up normally
    Closed,
}

#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a channel for `handle`, reporting through `events`
    ///
    /// Resolves once the remote handshake completes. If the handle is
    /// closed while the handshake is in flight, the socket is dropped and
    /// `Cancelled` is returned.
    async fn open(
        &self,
        config: &LiveConfig,
        handle: SessionHandle,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<()>;
}

pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("TLS crypto provider already installed");
    }
}

async fn handshake(config: &LiveConfig) -> Result<(WsSink, WsSource)> {
    let url = config.url()?;
    info!("Connecting to live endpoint {} (model {})", config.endpoint, config.model);

    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| VoiceError::ConnectionFailed(format!("WebSocket connect failed: {}", e)))?;
    let (mut sink, mut source) = stream.split();

    let setup = serde_json::to_string(&config.setup_message())
        .map_err(|e| VoiceError::ConnectionFailed(format!("Failed to encode setup: {}", e)))?;
    sink.send(Message::Text(setup))
        .await
        .map_err(|e| VoiceError::ConnectionFailed(format!("Failed to send setup: {}", e)))?;
    debug!("Setup sent, waiting for setupComplete");

    while let Some(message) = source.next().await {
        let message =
            message.map_err(|e| VoiceError::ConnectionFailed(format!("Handshake failed: {}", e)))?;
        let Some(text) = message_text(&message) else {
            if let Message::Close(frame) = message {
                return Err(VoiceError::ConnectionFailed(describe_close(frame.as_ref())));
            }
            continue;
        };
        match ServerMessage::parse(&text) {
            Ok(parsed) if parsed.is_setup_complete() => return Ok((sink, source)),
            Ok(parsed) => {
                if let Some(error) = parsed.error {
                    return Err(VoiceError::ConnectionFailed(error.message));
                }
                debug!("Ignoring message received before setupComplete");
            }
            Err(e) => warn!("Unparseable message during handshake: {}", e),
        }
    }

    Err(VoiceError::ConnectionFailed(
        "connection closed before setup completed".to_string(),
    ))
}

fn message_text(message: &Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.clone()),
        Message::Binary(bytes) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

fn describe_close(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) if !frame.reason.is_empty() => frame.reason.to_string(),
        Some(frame) => format!("connection closed with code {}", u16::from(frame.code)),
        None => "connection closed".to_string(),
    }
}

async fn write_loop(mut sink: WsSink, mut outbound: mpsc::UnboundedReceiver<OutboundFrame>) {
    let mut sent: u64 = 0;
    while let Some(frame) = outbound.recv().await {
        let OutboundFrame::Audio { mime_type, payload } = frame;
        let text = match serde_json::to_string(&RealtimeInputMessage::audio(&mime_type, payload)) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode outbound frame: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::Text(text)).await {
            warn!("Live channel write failed after {} frames: {}", sent, e);
            return;
        }
        sent += 1;
        if sent % 50 == 0 {
            debug!("Sent {} audio frames", sent);
        }
    }

    if let Err(e) = sink.close().await {
        debug!("Close frame not delivered: {}", e);
    }
    debug!("Live channel writer finished after {} frames", sent);
}

async fn read_loop(mut source: WsSource, events: mpsc::UnboundedSender<TransportEvent>) {
    while let Some(message) = source.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                let _ = events.send(TransportEvent::Error(VoiceError::ConnectionFailed(
                    e.to_string(),
                )));
                return;
            }
        };

        if let Message::Close(frame) = &message {
            match frame {
                Some(f) if f.code != CloseCode::Normal => {
                    let message = describe_close(Some(f));
                    warn!("Live channel closed abnormally: {}", message);
                    let _ = events.send(TransportEvent::Message(InboundMessage::SessionError {
                        message,
                    }));
                }
                _ => {
                    info!("Live channel closed by remote");
                    let _ = events.send(TransportEvent::Closed);
                }
            }
            return;
        }

        let Some(text) = message_text(&message) else {
            continue;
        };
        let parsed = match ServerMessage::parse(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Dropping unparseable server message: {}", e);
                continue;
            }
        };
        if parsed.go_away.is_some() {
            warn!("Server announced it will close the session soon");
        }
        if parsed
            .server_content
            .as_ref()
            .map_or(false, |content| content.interrupted)
        {
            debug!("Model turn interrupted");
        }
        for inbound in parsed.into_inbound() {
            if events.send(TransportEvent::Message(inbound)).is_err() {
                return;
            }
        }
    }

    let _ = events.send(TransportEvent::Closed);
}

#[async_trait]
impl LiveTransport for WebSocketTransport {
    async fn open(
        &self,
        config: &LiveConfig,
        handle: SessionHandle,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<()> {
        install_crypto_provider();

        let (sink, source) = tokio::time::timeout(config.connect_timeout, handshake(config))
            .await
            .map_err(|_| {
                VoiceError::ConnectionFailed(format!(
                    "handshake timed out after {}s",
                    config.connect_timeout.as_secs()
                ))
            })??;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        if !handle.attach(outbound_tx) {
            // Dropping both halves tears the socket down
            info!("Session closed during handshake, discarding connection");
            return Err(VoiceError::Cancelled);
        }

        info!("Live channel open");
        let _ = events.send(TransportEvent::Opened);

        tokio::spawn(write_loop(sink, outbound_rx));
        handle.track(tokio::spawn(read_loop(source, events)));

        Ok(())
    }
}
