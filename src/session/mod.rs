//! Live voice session management
//!
//! This module provides the `VoiceSession` controller that manages:
//! - Conversation state (disconnected, connecting, listening, speaking)
//! - Audio resource lifecycle (microphone, playback context, volume meter)
//! - The live connection to the remote model
//! - Transcript accumulation and session statistics

mod config;
mod resources;
mod session;
mod state;
mod stats;
mod transcript;

pub use config::{new_session_id, SessionConfig};
pub use resources::CaptureHandles;
pub use session::VoiceSession;
pub use state::{ConversationState, ConversationStateMachine, StateEvent};
pub use stats::{EndReason, SessionReport, SessionStats};
pub use transcript::{Role, TranscriptionAccumulator, TranscriptionTurn};
