//! Caller-side handle on a live channel
//!
//! The handle exists before the channel does. Frames sent while it is still
//! pending, or after it is closed, are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::audio::codec::EncodedPayload;

/// Frames queued for the socket writer
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Audio {
        mime_type: String,
        payload: EncodedPayload,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Pending,
    Open,
    Closed,
}

struct HandleInner {
    state: HandleState,
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<HandleInner>>,
    input_mime_type: Arc<str>,
    frames_sent: Arc<AtomicU64>,
}

impl SessionHandle {
    pub fn new(input_mime_type: impl Into<String>) -> Self {
        let input_mime_type: String = input_mime_type.into();
        Self {
            inner: Arc::new(Mutex::new(HandleInner {
                state: HandleState::Pending,
                outbound: None,
                tasks: Vec::new(),
            })),
            input_mime_type: Arc::from(input_mime_type),
            frames_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> HandleState {
        self.lock().state
    }

    pub fn input_mime_type(&self) -> &str {
        &self.input_mime_type
    }

    /// Queue one audio frame; returns false if it was dropped
    pub fn send(&self, payload: EncodedPayload) -> bool {
        let inner = self.lock();
        if inner.state != HandleState::Open {
            return false;
        }
        let Some(outbound) = &inner.outbound else {
            return false;
        };
        let frame = OutboundFrame::Audio {
            mime_type: self.input_mime_type.to_string(),
            payload,
        };
        if outbound.send(frame).is_ok() {
            self.frames_sent.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Connect the handle to a socket writer
    ///
    /// Returns false if the handle was closed in the meantime; the caller
    /// then owns the teardown of whatever it opened.
    pub fn attach(&self, outbound: mpsc::UnboundedSender<OutboundFrame>) -> bool {
        let mut inner = self.lock();
        if inner.state == HandleState::Closed {
            return false;
        }
        inner.outbound = Some(outbound);
        inner.state = HandleState::Open;
        true
    }

    /// Tie a transport task to the handle's lifetime
    pub fn track(&self, task: JoinHandle<()>) {
        let mut inner = self.lock();
        if inner.state == HandleState::Closed {
            task.abort();
        } else {
            inner.tasks.push(task);
        }
    }

    /// Close the channel. Idempotent, never fails.
    pub fn close(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = HandleState::Closed;
        // Dropping the sender lets the writer send its close frame and exit
        inner.outbound = None;
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        match previous {
            HandleState::Open => info!(
                "Live channel closed after {} frames",
                self.frames_sent.load(Ordering::Relaxed)
            ),
            HandleState::Pending => debug!("Live channel closed before it opened"),
            HandleState::Closed => {}
        }
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_on_pending_handle_is_dropped() {
        let handle = SessionHandle::new("audio/pcm;rate=16000");
        assert_eq!(handle.state(), HandleState::Pending);
        assert!(!handle.send(EncodedPayload::from_bytes(&[0, 0])));
        assert_eq!(handle.frames_sent(), 0);
    }

    #[test]
    fn test_open_handle_forwards_frames_in_order() {
        let handle = SessionHandle::new("audio/pcm;rate=16000");
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(handle.attach(tx));

        assert!(handle.send(EncodedPayload::from_bytes(&[1, 0])));
        assert!(handle.send(EncodedPayload::from_bytes(&[2, 0])));
        assert_eq!(handle.frames_sent(), 2);

        let first = rx.try_recv().unwrap();
        assert_eq!(
            first,
            OutboundFrame::Audio {
                mime_type: "audio/pcm;rate=16000".to_string(),
                payload: EncodedPayload::from_bytes(&[1, 0]),
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), OutboundFrame::Audio { .. }));
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_attach() {
        let handle = SessionHandle::new("audio/pcm;rate=16000");
        handle.close();
        handle.close();
        assert_eq!(handle.state(), HandleState::Closed);

        let (tx, rx) = mpsc::unbounded_channel();
        assert!(!handle.attach(tx));
        assert!(!handle.send(EncodedPayload::from_bytes(&[0, 0])));
        drop(rx);
    }

    #[test]
    fn test_close_drops_outbound_sender() {
        let handle = SessionHandle::new("audio/pcm;rate=16000");
        let (tx, mut rx) = mpsc::unbounded_channel();
        handle.attach(tx);
        handle.close();
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
