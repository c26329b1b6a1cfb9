//! HTTP API for driving the voice session from a browser or script
//!
//! - POST /session/start - Start a voice session
//! - POST /session/stop - Stop it and return final statistics
//! - GET /session/status - Session statistics
//! - GET /session/transcript - Committed transcript entries
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
