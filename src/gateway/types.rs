//! Core types for the model gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for usage tracking and debugging.
///
/// Every request through the gateway carries attribution so usage records
/// can be tied back to:
/// - Which evaluation it belongs to (evaluation_id)
/// - Which code path triggered it (caller)
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Evaluation this request is part of.
    pub evaluation_id: Option<Uuid>,
    /// Which code path made this call, e.g. "judge::technical".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_evaluation(mut self, evaluation_id: Uuid) -> Self {
        self.evaluation_id = Some(evaluation_id);
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Which backend model serves a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatModel {
    /// Locally served Ollama model, e.g. "llama3.1:8b-instruct-q4_K_M".
    Ollama(String),
}

impl ChatModel {
    pub fn ollama(model_id: impl Into<String>) -> Self {
        ChatModel::Ollama(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        match self {
            ChatModel::Ollama(id) => id,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ChatModel::Ollama(_) => "ollama",
        }
    }
}

/// Request for chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model to use.
    pub model: ChatModel,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature. Judges always send 0.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Whether to ask the backend for JSON-constrained output.
    pub json_mode: bool,
    /// Attribution for usage tracking.
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: ChatModel, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model,
            messages,
            temperature: 0.0,
            max_tokens: None,
            json_mode: false,
            attribution,
        }
    }

    /// Single user-message request, the shape every judge prompt takes.
    pub fn prompt(model: ChatModel, prompt: impl Into<String>, attribution: Attribution) -> Self {
        Self::new(model, vec![Message::user(prompt)], attribution)
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Load,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("load") => FinishReason::Load,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated text.
    pub content: String,
    /// Prompt tokens evaluated by the backend.
    pub input_tokens: u32,
    /// Tokens generated.
    pub output_tokens: u32,
    /// Wall-clock time for the request.
    pub latency: Duration,
    /// Why generation stopped.
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    pub(crate) fn empty() -> Self {
        Self {
            content: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Unknown("error".to_string()),
        }
    }
}
