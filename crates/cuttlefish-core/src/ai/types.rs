//! Wire types for OpenAI-compatible chat completion streaming
//!
//! These are NOT domain types - conversations and messages live in `storage`.

use serde::{Deserialize, Serialize};

/// Message role in a completion prompt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One prompt turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Parameters for opening a completion stream
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub messages: Vec<ChatMessage>,
    /// Omitted on the wire when empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChoiceDelta>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ChoiceDelta {
    #[serde(default)]
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionChunk {
    /// Chunk with a single choice carrying `text`
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![ChoiceDelta {
                delta: Delta {
                    content: Some(text.into()),
                },
                finish_reason: None,
            }],
        }
    }

    /// Text of the first choice, or `None` when the chunk has no choices
    pub fn first_delta_text(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|choice| choice.delta.content.as_deref().unwrap_or_default())
    }
}

/// Item delivered on a completion stream channel.
///
/// The stream ends when the channel closes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    Chunk(CompletionChunk),
    /// Transport or decode failure; nothing follows it
    Error { error: String },
}
