//! Chat-completion request shapes.
//!
//! A [`CompletionRequest`] is always exactly two turns: the system
//! instruction followed by the user's utterance.  Both are taken verbatim;
//! nothing is trimmed or templated here.

use serde::Serialize;

/// Speaker of a chat turn.  Serialised lowercase (`"system"`, `"user"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// Build the `[system, user]` request for one utterance.
    pub fn new(model: impl Into<String>, system_prompt: &str, utterance: &str) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(utterance)],
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
