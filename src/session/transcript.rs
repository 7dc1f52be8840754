use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A finalized turn of the live transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionTurn {
    pub role: Role,
    pub text: String,
}

/// Merges transcript fragments of the model's in-progress turn.
///
/// Only the model side is transcribed; the service does not echo the user's speech.
#[derive(Debug, Default)]
pub struct TranscriptionAccumulator {
    pending: String,
    turns: Vec<TranscriptionTurn>,
}

impl TranscriptionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        self.pending.push_str(fragment);
    }

    /// Finalize the pending text as a model turn. Nothing is appended when no fragment
    /// arrived during the turn.
    pub fn complete_turn(&mut self) -> Option<&TranscriptionTurn> {
        if self.pending.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.pending);
        self.turns.push(TranscriptionTurn {
            role: Role::Model,
            text,
        });
        self.turns.last()
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn turns(&self) -> &[TranscriptionTurn] {
        &self.turns
    }

    /// Discard everything; used when the session ends
    pub fn clear(&mut self) {
        self.pending.clear();
        self.turns.clear();
    }
}
