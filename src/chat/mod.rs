//! Text-mode conversation with the same assistant
//!
//! The text model itself is a collaborator behind the `TextModel` trait. This module owns
//! the history, how it is replayed to the model, and how replies are interpreted: a reply
//! that looks like a JSON array is treated as a multiple-choice quiz.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::VoiceResult;
use crate::live::messages::{Content, MediaBlob, Part};
use crate::session::Role;

/// Text shown in place of a quiz reply
pub const QUIZ_INTRO: &str = "Voici le QCM demandé :";

/// Text shown when the model could not be reached
pub const FAILURE_TEXT: &str = "Erreur de connexion ou fichier trop volumineux.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
}

/// File sent along with a user message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: String, // Base64-encoded file contents
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<QuizQuestion>>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
            attachment: None,
            quiz: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn model(reply: ModelReply) -> Self {
        let (text, quiz) = match reply {
            ModelReply::Text(text) => (text, None),
            ModelReply::Quiz(questions) => (QUIZ_INTRO.to_string(), Some(questions)),
        };
        Self {
            role: Role::Model,
            text,
            timestamp: Utc::now(),
            attachment: None,
            quiz,
        }
    }

    pub fn is_quiz(&self) -> bool {
        self.quiz.is_some()
    }

    /// Render the message as it is replayed to the model.
    ///
    /// A quiz is replayed as a system note carrying its JSON so the model can refer to it.
    pub fn to_content(&self) -> Content {
        let mut parts = Vec::new();

        if let Some(attachment) = &self.attachment {
            parts.push(Part {
                text: None,
                inline_data: Some(MediaBlob {
                    mime_type: attachment.mime_type.clone(),
                    data: attachment.data.clone(),
                }),
            });
        }

        let text = match &self.quiz {
            Some(quiz) => {
                let json = serde_json::to_string(quiz).unwrap_or_default();
                Some(format!("[SYSTEM: L'IA a généré ce QCM: {}]", json))
            }
            None if !self.text.is_empty() => Some(self.text.clone()),
            None => None,
        };
        if let Some(text) = text {
            parts.push(Part {
                text: Some(text),
                inline_data: None,
            });
        }

        let role = match self.role {
            Role::User => "user",
            Role::Model => "model",
        };
        Content {
            role: Some(role.to_string()),
            parts,
        }
    }
}

/// Interpretation of a model reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    Text(String),
    Quiz(Vec<QuizQuestion>),
}

impl ModelReply {
    /// A reply wrapped in `[` and `]` is tried as a quiz; anything that does not parse stays text.
    pub fn parse(reply: &str) -> Self {
        let trimmed = reply.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            match serde_json::from_str::<Vec<QuizQuestion>>(trimmed) {
                Ok(questions) => return ModelReply::Quiz(questions),
                Err(e) => warn!("Reply looked like a quiz but did not parse: {}", e),
            }
        }
        ModelReply::Text(reply.to_string())
    }
}

/// One-shot text generation over a full history
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, contents: &[Content]) -> VoiceResult<String>;
}

/// Text conversation history plus the model that answers it
pub struct TextChat {
    model: Box<dyn TextModel>,
    instruction: String,
    messages: Vec<ChatMessage>,
}

impl TextChat {
    pub fn new(model: Box<dyn TextModel>, instruction: impl Into<String>) -> Self {
        Self {
            model,
            instruction: instruction.into(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Full request: the instruction as a leading user turn, then the history
    pub fn contents(&self) -> Vec<Content> {
        let mut instruction = Content::text(self.instruction.clone());
        instruction.role = Some("user".to_string());

        std::iter::once(instruction)
            .chain(self.messages.iter().map(ChatMessage::to_content))
            .collect()
    }

    /// Append the user's message, ask the model, and append its reply.
    ///
    /// A model failure is recorded as a model message rather than returned.
    pub async fn send(&mut self, message: ChatMessage) -> &ChatMessage {
        self.messages.push(message);

        let reply = match self.model.generate(&self.contents()).await {
            Ok(text) => ChatMessage::model(ModelReply::parse(&text)),
            Err(e) => {
                warn!("Text model request failed: {}", e);
                ChatMessage::model(ModelReply::Text(FAILURE_TEXT.to_string()))
            }
        };

        if reply.is_quiz() {
            info!("Model replied with a quiz");
        }
        self.messages.push(reply);

        &self.messages[self.messages.len() - 1]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
