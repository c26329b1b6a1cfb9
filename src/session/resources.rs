//! Everything one live session owns
//!
//! The channel, the capture pipeline, the playback scheduler with its output
//! device, and the session's tasks are released together, in a fixed
//! order, exactly once.

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::capture::CaptureHandle;
use crate::live::handle::SessionHandle;
use crate::playback::scheduler::PlaybackScheduler;

pub struct LiveSession {
    pub id: String,
    pub generation: u64,
    pub handle: SessionHandle,
    pub capture: Option<CaptureHandle>,
    pub scheduler: PlaybackScheduler,
    tasks: Vec<JoinHandle<()>>,
    released: bool,
}

impl LiveSession {
    pub fn new(
        id: String,
        generation: u64,
        handle: SessionHandle,
        scheduler: PlaybackScheduler,
    ) -> Self {
        Self {
            id,
            generation,
            handle,
            capture: None,
            scheduler,
            tasks: Vec::new(),
            released: false,
        }
    }

    pub fn track(&mut self, task: JoinHandle<()>) {
        if self.released {
            task.abort();
        } else {
            self.tasks.push(task);
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.handle.frames_sent()
    }

    /// Tear everything down. Idempotent; every step runs even if an
    /// earlier one fails.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        info!("Releasing session {}", self.id);

        self.handle.close();

        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop() {
                warn!("Failed to stop capture for session {}: {}", self.id, e);
            }
        }

        self.scheduler.stop();
        if let Err(e) = self.scheduler.close_output() {
            warn!("Failed to close audio output for session {}: {}", self.id, e);
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Session {} released", self.id);
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.release();
    }
}
