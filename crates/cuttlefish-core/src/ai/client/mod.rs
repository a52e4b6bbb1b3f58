//! Completion stream client
//!
//! The orchestrator only depends on [`CompletionClient`]; `OpenAiClient` is
//! the production implementation.

mod config;
mod streaming;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{CompletionRequest, StreamPart};

pub use config::ClientConfig;
pub use streaming::OpenAiClient;

/// Receiving half of a completion stream. Closed channel means end of stream.
pub type CompletionStream = mpsc::UnboundedReceiver<StreamPart>;

/// Opens incremental completion streams
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Open a stream. Errors here are failures to open it at all; failures
    /// after the stream started arrive as `StreamPart::Error`.
    async fn create_stream(&self, request: CompletionRequest) -> anyhow::Result<CompletionStream>;
}
