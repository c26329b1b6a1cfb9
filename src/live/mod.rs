pub mod client;
pub mod handle;
pub mod messages;

pub use client::{LiveConfig, LiveTransport, TransportEvent, WebSocketTransport};
pub use handle::{HandleState, OutboundFrame, SessionHandle};
pub use messages::{sample_rate_from_mime, InboundMessage, ServerMessage};
