//! HTTP API for controlling voice sessions
//!
//! This module provides a REST API over the turn controller:
//! - POST /sessions - Start a new voice session
//! - POST /sessions/:key/mute - Mute (stops capture and output)
//! - POST /sessions/:key/unmute - Unmute (resumes listening)
//! - POST /sessions/:key/end - End a session
//! - GET /sessions/:key/status - Query session status
//! - GET /sessions/:key/transcript - Get the turn log
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{ErrorResponse, SessionStatus, StartSessionRequest, StartSessionResponse};
pub use routes::create_router;
pub use state::{AppState, SessionSlot, ENDED_RETENTION};
