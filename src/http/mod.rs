//! HTTP API server for external control
//!
//! This module provides a REST API for controlling the voice session:
//! - POST /voice/start - Start a conversation
//! - POST /voice/stop - Stop it from any state
//! - GET /voice/status - Query state, volume and statistics
//! - GET /voice/transcript - Get finalized turns and the turn in progress
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
