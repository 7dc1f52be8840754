use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::ConversationState;
use super::transcript::TranscriptionTurn;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    UserStop,
    RemoteClosed,
    RemoteClosedAbnormally(String),
    TransportError(String),
    /// Device acquisition or the open handshake failed
    StartFailed(String),
}

impl EndReason {
    /// Whether the end should be surfaced to the user as an error
    pub fn is_error(&self) -> bool {
        !matches!(self, EndReason::UserStop | EndReason::RemoteClosed)
    }
}

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: ConversationState,

    /// When the session was started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio chunks forwarded to the service
    pub chunks_sent: u64,

    /// Inbound audio payloads received
    pub payloads_received: u64,

    /// Payloads decoded and scheduled for playback
    pub buffers_scheduled: u64,

    /// Payloads dropped because they failed to decode
    pub decode_failures: u64,

    /// Buffers currently scheduled or playing
    pub active_buffers: usize,

    /// Finalized transcript turns
    pub turns_count: usize,

    /// Set once the session has ended
    pub end_reason: Option<EndReason>,
}

impl SessionStats {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: ConversationState::Disconnected,
            started_at: Utc::now(),
            duration_secs: 0.0,
            chunks_sent: 0,
            payloads_received: 0,
            buffers_scheduled: 0,
            decode_failures: 0,
            active_buffers: 0,
            turns_count: 0,
            end_reason: None,
        }
    }

    pub fn refresh_duration(&mut self) {
        let duration = Utc::now().signed_duration_since(self.started_at);
        self.duration_secs = duration.num_milliseconds() as f64 / 1000.0;
    }
}

/// Point-in-time view of a session for observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub stats: SessionStats,
    /// Finalized turns; discarded when the session ends
    pub turns: Vec<TranscriptionTurn>,
    /// Text of the model's turn in progress
    pub pending: String,
}

impl SessionReport {
    pub fn idle() -> Self {
        Self {
            stats: SessionStats::new(""),
            turns: Vec::new(),
            pending: String::new(),
        }
    }
}
