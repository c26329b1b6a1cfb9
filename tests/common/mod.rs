// Shared fakes for integration tests
//
// Each fake reports into a cloneable probe so a test can drive it (open the
// handshake gate, push microphone blocks, move the output clock) and
// inspect what the session did with it.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meld_voice::audio::{AudioBackend, AudioBuffer, AudioFrame};
use meld_voice::error::{Result, VoiceError};
use meld_voice::live::{LiveConfig, LiveTransport, OutboundFrame, SessionHandle, TransportEvent};
use meld_voice::playback::{AudioOutput, UnitId};
use meld_voice::session::{DeviceProvider, SessionConfig, SessionController, SessionState};
use tokio::sync::{mpsc, Notify};

// ============================================================================
// Transport
// ============================================================================

#[derive(Clone, Default)]
pub struct TransportProbe {
    pub gated: Arc<AtomicBool>,
    pub gate: Arc<Notify>,
    pub fail_with: Arc<Mutex<Option<VoiceError>>>,
    pub events: Arc<Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>>,
    pub outbound: Arc<Mutex<Option<mpsc::UnboundedReceiver<OutboundFrame>>>>,
    pub opens: Arc<AtomicUsize>,
    pub cancelled: Arc<AtomicUsize>,
}

impl TransportProbe {
    /// Hold the next handshakes until `release()`
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }

    /// Deliver an event as if the remote sent it
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    /// Frames the session handed to the channel so far
    pub fn drain_outbound(&self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        if let Some(rx) = self.outbound.lock().unwrap().as_mut() {
            while let Ok(frame) = rx.try_recv() {
                frames.push(frame);
            }
        }
        frames
    }

    /// True once the session dropped its side of the channel
    pub fn outbound_closed(&self) -> bool {
        match self.outbound.lock().unwrap().as_mut() {
            Some(rx) => matches!(
                rx.try_recv(),
                Err(mpsc::error::TryRecvError::Disconnected)
            ),
            None => true,
        }
    }
}

pub struct FakeTransport {
    pub probe: TransportProbe,
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn open(
        &self,
        _config: &LiveConfig,
        handle: SessionHandle,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<()> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.probe.gated.load(Ordering::SeqCst) {
            self.probe.gate.notified().await;
        }
        let failure = self.probe.fail_with.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if !handle.attach(tx) {
            self.probe.cancelled.fetch_add(1, Ordering::SeqCst);
            return Err(VoiceError::Cancelled);
        }
        *self.probe.outbound.lock().unwrap() = Some(rx);
        let _ = events.send(TransportEvent::Opened);
        *self.probe.events.lock().unwrap() = Some(events);
        Ok(())
    }
}

// ============================================================================
// Capture backend
// ============================================================================

#[derive(Clone, Default)]
pub struct BackendProbe {
    pub gated: Arc<AtomicBool>,
    pub gate: Arc<Notify>,
    pub fail_with: Arc<Mutex<Option<VoiceError>>>,
    pub sender: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    pub starts: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
    pub capturing: Arc<AtomicBool>,
}

impl BackendProbe {
    pub fn hold(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }

    pub fn is_acquired(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    /// Push one device block into the capture pipeline
    pub fn push(&self, samples: Vec<f32>, sample_rate: u32, channels: u16) -> bool {
        let sender = self.sender.lock().unwrap().clone();
        match sender {
            Some(tx) => tx
                .try_send(AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms: 0,
                })
                .is_ok(),
            None => false,
        }
    }
}

pub struct FakeBackend {
    pub probe: BackendProbe,
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if self.probe.gated.load(Ordering::SeqCst) {
            self.probe.gate.notified().await;
        }
        let failure = self.probe.fail_with.lock().unwrap().clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(64);
        *self.probe.sender.lock().unwrap() = Some(tx);
        self.probe.capturing.store(true, Ordering::SeqCst);
        Ok(rx)
    }

    fn stop(&mut self) -> Result<()> {
        if self.probe.capturing.swap(false, Ordering::SeqCst) {
            self.probe.releases.fetch_add(1, Ordering::SeqCst);
        }
        self.probe.sender.lock().unwrap().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.probe.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Default)]
pub struct OutputProbe {
    pub clock: Arc<Mutex<f64>>,
    /// (unit, start time, duration)
    pub scheduled: Arc<Mutex<Vec<(UnitId, f64, f64)>>>,
    pub stopped: Arc<Mutex<Vec<UnitId>>>,
    pub ended: Arc<Mutex<Vec<UnitId>>>,
    pub closed: Arc<AtomicBool>,
    pub fail_open: Arc<AtomicBool>,
}

impl OutputProbe {
    pub fn set_clock(&self, seconds: f64) {
        *self.clock.lock().unwrap() = seconds;
    }

    pub fn scheduled(&self) -> Vec<(UnitId, f64, f64)> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn finish(&self, unit: UnitId) {
        self.ended.lock().unwrap().push(unit);
    }
}

pub struct FakeOutput {
    pub probe: OutputProbe,
    next_id: u64,
}

impl FakeOutput {
    pub fn new(probe: OutputProbe) -> Self {
        Self { probe, next_id: 0 }
    }
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        *self.probe.clock.lock().unwrap()
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_time: f64) -> Result<UnitId> {
        self.next_id += 1;
        let id = UnitId(self.next_id);
        self.probe
            .scheduled
            .lock()
            .unwrap()
            .push((id, start_time, buffer.duration()));
        Ok(id)
    }

    fn stop_unit(&mut self, unit: UnitId) {
        self.probe.stopped.lock().unwrap().push(unit);
    }

    fn take_ended(&mut self) -> Vec<UnitId> {
        std::mem::take(&mut *self.probe.ended.lock().unwrap())
    }

    fn close(&mut self) -> Result<()> {
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Devices and controller
// ============================================================================

pub struct FakeDevices {
    pub backend: BackendProbe,
    pub output: OutputProbe,
}

impl DeviceProvider for FakeDevices {
    fn capture_backend(&self, _config: &SessionConfig) -> Box<dyn AudioBackend> {
        Box::new(FakeBackend {
            probe: self.backend.clone(),
        })
    }

    fn open_output(&self, _config: &SessionConfig) -> Result<Box<dyn AudioOutput>> {
        if self.output.fail_open.load(Ordering::SeqCst) {
            return Err(VoiceError::DeviceUnavailable(
                "no output device".to_string(),
            ));
        }
        Ok(Box::new(FakeOutput::new(self.output.clone())))
    }
}

#[derive(Clone, Default)]
pub struct Probes {
    pub transport: TransportProbe,
    pub backend: BackendProbe,
    pub output: OutputProbe,
}

/// Controller wired to fakes, with small frames so tests stay fast
pub fn fake_controller() -> (SessionController, Probes) {
    let probes = Probes::default();
    let mut config = SessionConfig::default();
    config.capture.frame_size = 160;

    let controller = SessionController::new(
        config,
        Arc::new(FakeTransport {
            probe: probes.transport.clone(),
        }),
        Arc::new(FakeDevices {
            backend: probes.backend.clone(),
            output: probes.output.clone(),
        }),
    );
    (controller, probes)
}

pub async fn wait_for_state(controller: &SessionController, state: SessionState) {
    let mut updates = controller.subscribe();
    tokio::time::timeout(Duration::from_secs(2), updates.wait_for(|view| view.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {:?}", state))
        .expect("controller dropped");
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
