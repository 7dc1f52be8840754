use crate::session::VoiceSession;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The one voice session controller
    pub voice: Arc<VoiceSession>,
}

impl AppState {
    pub fn new(voice: Arc<VoiceSession>) -> Self {
        Self { voice }
    }
}
