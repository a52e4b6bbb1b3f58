//! AI provider layer
//!
//! Streams chat completions from OpenAI-compatible APIs.

pub mod client;
pub mod sse;
pub mod types;

pub use client::{ClientConfig, CompletionClient, CompletionStream, OpenAiClient};
pub use types::{ChatMessage, ChatRole, CompletionChunk, CompletionRequest, StreamPart};
