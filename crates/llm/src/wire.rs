//! JSON shapes of the chat-completions endpoint.

use serde::{Deserialize, Serialize};

use crate::model::CompletionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: WireRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f64,
}

impl ChatCompletionRequest {
    /// Builds a single-turn request: the fixed system instruction followed by one user message.
    pub fn single_turn(config: &CompletionConfig, text: impl Into<String>) -> Self {
        Self {
            model: config.model.clone(),
            messages: vec![
                WireMessage::new(WireRole::System, config.system_prompt.clone()),
                WireMessage::new(WireRole::User, text),
            ],
            temperature: config.temperature,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Returns the first choice's text when it is present and non-empty.
    pub fn reply_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorEnvelope {
    pub fn message(self) -> Option<String> {
        self.error
            .and_then(|error| error.message)
            .filter(|message| !message.trim().is_empty())
    }
}
