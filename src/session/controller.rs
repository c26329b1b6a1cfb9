// Session lifecycle controller
//
// All session state sits behind one async mutex. Public commands, the
// transport event loop and the capture acquisition task take turns on it,
// so every transition happens on a single logical timeline.
//
// Each `start()` bumps a generation counter. Background work belonging to
// an older generation finds the counter moved on and releases whatever it
// acquired instead of installing it.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use super::resources::LiveSession;
use super::state::SessionState;
use super::stats::SessionStats;
use super::transcript::{TranscriptAssembler, TranscriptEntry};
use crate::audio::backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource};
use crate::audio::capture::{CapturePipeline, CaptureSettings};
use crate::error::{Result, VoiceError};
use crate::live::client::{LiveConfig, LiveTransport, TransportEvent, WebSocketTransport};
use crate::live::handle::SessionHandle;
use crate::live::messages::{sample_rate_from_mime, InboundMessage};
use crate::playback::output::{AudioOutput, DeviceOutput, SilentOutput};
use crate::playback::scheduler::PlaybackScheduler;

pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_CONNECTING: &str = "Connecting...";
pub const STATUS_LISTENING: &str = "Connected. Listening...";
pub const STATUS_ENDED: &str = "Session ended.";
pub const STATUS_MICROPHONE: &str = "Could not access microphone. Please check permissions.";

fn error_status(error: &VoiceError) -> String {
    format!("Error: {}. Please try again.", error)
}

/// Where a session gets its audio devices from
pub trait DeviceProvider: Send + Sync {
    /// Capture backend for a new session; the device itself is acquired
    /// when the backend starts
    fn capture_backend(&self, config: &SessionConfig) -> Box<dyn AudioBackend>;

    /// Open the output device for a new session
    fn open_output(&self, config: &SessionConfig) -> Result<Box<dyn AudioOutput>>;
}

/// Real microphone (or WAV file) and speakers
pub struct SystemDevices;

impl DeviceProvider for SystemDevices {
    fn capture_backend(&self, config: &SessionConfig) -> Box<dyn AudioBackend> {
        let source = match &config.input_file {
            Some(path) => AudioSource::File(path.clone()),
            None => AudioSource::Microphone,
        };
        let backend_config = AudioBackendConfig {
            device: config.input_device.clone(),
            ..AudioBackendConfig::default()
        };
        AudioBackendFactory::create(&source, backend_config)
    }

    fn open_output(&self, config: &SessionConfig) -> Result<Box<dyn AudioOutput>> {
        if config.playback_enabled {
            Ok(Box::new(DeviceOutput::open()?))
        } else {
            Ok(Box::new(SilentOutput::new()))
        }
    }
}

/// Snapshot published on every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub state: SessionState,
    pub status: String,
    pub transcript_len: usize,
}

#[derive(Debug, Default)]
struct SessionRecord {
    id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    frames_sent: u64,
    chunks_played: u64,
    chunks_dropped: u64,
}

struct Inner {
    state: SessionState,
    status: String,
    generation: u64,
    session: Option<LiveSession>,
    transcript: TranscriptAssembler,
    record: SessionRecord,
}

impl Inner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.state.is_live()
    }

    fn view(&self) -> SessionView {
        SessionView {
            state: self.state,
            status: self.status.clone(),
            transcript_len: self.transcript.entries().len(),
        }
    }

    fn stats(&self) -> SessionStats {
        let duration_secs = self.record.started_at.map_or(0.0, |started| {
            let end = self.record.ended_at.unwrap_or_else(Utc::now);
            (end - started).num_milliseconds().max(0) as f64 / 1000.0
        });
        SessionStats {
            state: self.state,
            session_id: self.record.id.clone(),
            started_at: self.record.started_at,
            duration_secs,
            frames_sent: self
                .session
                .as_ref()
                .map_or(self.record.frames_sent, LiveSession::frames_sent),
            audio_chunks_played: self.record.chunks_played,
            audio_chunks_dropped: self.record.chunks_dropped,
            transcript_entries: self.transcript.entries().len(),
        }
    }

    /// Release the live session and settle in `state`
    fn teardown(&mut self, state: SessionState, status: String) {
        if let Some(mut session) = self.session.take() {
            self.record.frames_sent = session.frames_sent();
            session.release();
            self.record.ended_at = Some(Utc::now());
        }
        self.state = state;
        self.status = status;
    }

    fn fail(&mut self, error: VoiceError) {
        warn!("Voice session failed: {}", error);
        let status = if error.is_microphone_failure() {
            STATUS_MICROPHONE.to_string()
        } else {
            error_status(&error)
        };
        self.teardown(SessionState::Errored, status);
    }
}

struct Shared {
    inner: Mutex<Inner>,
    view: watch::Sender<SessionView>,
}

impl Shared {
    fn publish(&self, inner: &Inner) {
        self.view.send_replace(inner.view());
    }
}

/// Owns at most one live voice session at a time
pub struct SessionController {
    config: SessionConfig,
    transport: Arc<dyn LiveTransport>,
    devices: Arc<dyn DeviceProvider>,
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn LiveTransport>,
        devices: Arc<dyn DeviceProvider>,
    ) -> Self {
        let inner = Inner {
            state: SessionState::Idle,
            status: STATUS_IDLE.to_string(),
            generation: 0,
            session: None,
            transcript: TranscriptAssembler::new(),
            record: SessionRecord::default(),
        };
        let (view, _) = watch::channel(inner.view());
        Self {
            config,
            transport,
            devices,
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                view,
            }),
        }
    }

    /// Controller wired to the Gemini Live endpoint and the system's audio devices
    pub fn with_system_devices(config: SessionConfig) -> Self {
        Self::new(
            config,
            Arc::new(WebSocketTransport::new()),
            Arc::new(SystemDevices),
        )
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Begin a new session
    ///
    /// Returns once the session is `Connecting`. The channel handshake and
    /// the microphone acquisition continue in the background; their outcome
    /// shows up as a state change.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        if !inner.state.can_start() {
            warn!("Start requested while session is {}", inner.state);
            return Err(VoiceError::AlreadyActive);
        }

        inner.generation += 1;
        let generation = inner.generation;
        let session_id = uuid::Uuid::new_v4().to_string();

        inner.transcript = TranscriptAssembler::new();
        inner.record = SessionRecord {
            id: Some(session_id.clone()),
            started_at: Some(Utc::now()),
            ..SessionRecord::default()
        };

        let output = match self.devices.open_output(&self.config) {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to open audio output: {}", e);
                let status = error_status(&e);
                inner.teardown(SessionState::Errored, status);
                self.shared.publish(&inner);
                return Err(e);
            }
        };

        info!("Starting voice session {} (generation {})", session_id, generation);
        inner.state = SessionState::Connecting;
        inner.status = STATUS_CONNECTING.to_string();

        let handle = SessionHandle::new(self.config.input_mime_type());
        let mut session = LiveSession::new(
            session_id,
            generation,
            handle.clone(),
            PlaybackScheduler::new(output),
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(&self.shared);

        session.track(tokio::spawn(run_events(
            weak.clone(),
            generation,
            events_rx,
            self.config.output_sample_rate,
            self.config.output_channels,
        )));

        session.track(tokio::spawn(connect(
            weak.clone(),
            generation,
            Arc::clone(&self.transport),
            self.config.live.clone(),
            handle.clone(),
            events_tx,
        )));

        let backend = self.devices.capture_backend(&self.config);
        session.track(tokio::spawn(acquire_capture(
            weak,
            generation,
            backend,
            self.config.capture,
            handle,
        )));

        inner.session = Some(session);
        self.shared.publish(&inner);
        Ok(())
    }

    /// End the session, releasing every device and the channel
    ///
    /// Safe in every state and on repeated calls.
    pub async fn stop(&self) -> Result<SessionStats> {
        let mut inner = self.shared.inner.lock().await;
        match inner.state {
            SessionState::Closed | SessionState::Errored => {
                debug!("Stop requested while session is {}, nothing to do", inner.state);
            }
            SessionState::Idle => {
                inner.state = SessionState::Closed;
                inner.status = STATUS_ENDED.to_string();
                self.shared.publish(&inner);
            }
            SessionState::Connecting | SessionState::Active | SessionState::Closing => {
                info!("Stopping voice session");
                inner.state = SessionState::Closing;
                self.shared.publish(&inner);
                inner.teardown(SessionState::Closed, STATUS_ENDED.to_string());
                self.shared.publish(&inner);
            }
        }
        Ok(inner.stats())
    }

    pub fn state(&self) -> SessionState {
        self.shared.view.borrow().state
    }

    pub fn status(&self) -> String {
        self.shared.view.borrow().status.clone()
    }

    pub fn view(&self) -> SessionView {
        self.shared.view.borrow().clone()
    }

    /// Committed transcript entries of the current or last session
    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.shared.inner.lock().await.transcript.entries().to_vec()
    }

    pub async fn stats(&self) -> SessionStats {
        self.shared.inner.lock().await.stats()
    }

    /// Watch state, status and transcript length
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.shared.view.subscribe()
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        match self.shared.inner.try_lock() {
            Ok(mut inner) => {
                if inner.state.is_live() {
                    info!("Controller dropped, tearing down live session");
                    inner.teardown(SessionState::Closed, STATUS_ENDED.to_string());
                    self.shared.publish(&inner);
                }
            }
            // Whoever holds the lock keeps the last strong reference; the
            // session is released when it lets go.
            Err(_) => debug!("Controller dropped while session state is locked"),
        }
    }
}

async fn run_events(
    shared: Weak<Shared>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    default_rate: u32,
    channels: u16,
) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let mut inner = shared.inner.lock().await;
        if !inner.is_current(generation) {
            debug!("Dropping event for stale session generation {}", generation);
            return;
        }

        match event {
            TransportEvent::Opened => {
                if inner.state == SessionState::Connecting {
                    info!("Voice session active");
                    inner.state = SessionState::Active;
                    inner.status = STATUS_LISTENING.to_string();
                }
            }
            TransportEvent::Message(message) => {
                handle_message(&mut inner, message, default_rate, channels)
            }
            TransportEvent::Error(error) => inner.fail(error),
            TransportEvent::Closed => {
                info!("Remote ended the voice session");
                inner.teardown(SessionState::Closed, STATUS_ENDED.to_string());
            }
        }

        shared.publish(&inner);
    }
}

fn handle_message(inner: &mut Inner, message: InboundMessage, default_rate: u32, channels: u16) {
    match message {
        InboundMessage::AudioChunk { payload, mime_type } => {
            let Some(session) = inner.session.as_mut() else {
                return;
            };
            session.scheduler.reap();
            let rate = sample_rate_from_mime(&mime_type).unwrap_or(default_rate);
            match session.scheduler.enqueue(&payload, rate, channels) {
                Ok(_) => inner.record.chunks_played += 1,
                Err(e) => {
                    inner.record.chunks_dropped += 1;
                    warn!(
                        "Dropping model audio chunk ({} dropped so far): {}",
                        inner.record.chunks_dropped, e
                    );
                }
            }
        }
        InboundMessage::InputTranscriptDelta { text } => inner.transcript.append_input(&text),
        InboundMessage::OutputTranscriptDelta { text } => inner.transcript.append_output(&text),
        InboundMessage::TurnComplete => {
            for entry in inner.transcript.commit_turn() {
                info!("{:?}: {}", entry.speaker, entry.text);
            }
        }
        InboundMessage::SessionError { message } => inner.fail(VoiceError::SessionError(message)),
    }
}

async fn connect(
    shared: Weak<Shared>,
    generation: u64,
    transport: Arc<dyn LiveTransport>,
    config: LiveConfig,
    handle: SessionHandle,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let result = transport.open(&config, handle, events).await;
    let error = match result {
        Ok(()) => return,
        Err(VoiceError::Cancelled) => {
            debug!("Handshake for generation {} resolved after stop", generation);
            return;
        }
        Err(e) => e,
    };

    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.inner.lock().await;
    if inner.is_current(generation) {
        inner.fail(error);
        shared.publish(&inner);
    } else {
        debug!("Ignoring connect failure for stale generation {}: {}", generation, error);
    }
}

async fn acquire_capture(
    shared: Weak<Shared>,
    generation: u64,
    backend: Box<dyn AudioBackend>,
    settings: CaptureSettings,
    handle: SessionHandle,
) {
    let result = CapturePipeline::start(backend, settings, move |payload| {
        handle.send(payload);
    })
    .await;

    let Some(shared) = shared.upgrade() else {
        return;
    };
    let mut inner = shared.inner.lock().await;
    let current = inner.is_current(generation);

    match result {
        Ok(capture) if current => {
            if let Some(session) = inner.session.as_mut() {
                session.capture = Some(capture);
            }
        }
        Ok(mut capture) => {
            info!("Microphone acquired after session ended, releasing it");
            if let Err(e) = capture.stop() {
                warn!("Failed to release late microphone: {}", e);
            }
        }
        Err(e) if current => {
            inner.fail(e);
            shared.publish(&inner);
        }
        Err(e) => debug!("Ignoring capture failure for stale generation {}: {}", generation, e),
    }
}
