use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Conversational state shown by the indicator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Disconnected,
    Connecting,
    Listening,
    Speaking,
}

impl ConversationState {
    pub fn label(&self) -> &'static str {
        match self {
            ConversationState::Disconnected => "microphone off",
            ConversationState::Connecting => "connecting...",
            ConversationState::Listening => "listening...",
            ConversationState::Speaking => "assistant speaking",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, ConversationState::Disconnected)
    }
}

/// Inputs that may move the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    StartRequested,
    Opened,
    /// A buffer of the model's speech was scheduled
    AudioScheduled,
    PlaybackDrained,
    /// User stop, remote close, or unrecoverable error
    Ended,
}

/// Single source of truth for [`ConversationState`]; publishes every change
pub struct ConversationStateMachine {
    state: ConversationState,
    tx: watch::Sender<ConversationState>,
}

impl ConversationStateMachine {
    pub fn new(tx: watch::Sender<ConversationState>) -> Self {
        let state = *tx.borrow();
        Self { state, tx }
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    /// Apply an event; returns the new state if it changed. Events that are not valid in
    /// the current state are ignored.
    pub fn handle(&mut self, event: StateEvent) -> Option<ConversationState> {
        use ConversationState::*;

        let next = match (self.state, event) {
            (Disconnected, StateEvent::StartRequested) => Connecting,
            (Connecting, StateEvent::Opened) => Listening,
            (Listening, StateEvent::AudioScheduled) => Speaking,
            (Speaking, StateEvent::PlaybackDrained) => Listening,
            (Connecting | Listening | Speaking, StateEvent::Ended) => Disconnected,
            (state, event) => {
                debug!("Ignoring {:?} while {:?}", event, state);
                return None;
            }
        };

        debug!("State {:?} -> {:?}", self.state, next);
        self.state = next;
        self.tx.send_replace(next);
        Some(next)
    }
}
