//! Streaming API calls
//!
//! Posts a chat completion request with `stream: true` and forwards parsed
//! SSE chunks through a channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::ClientConfig;
use super::{CompletionClient, CompletionStream};
use crate::ai::sse::{SseEvent, SseParser};
use crate::ai::types::{CompletionRequest, StreamPart};

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: ClientConfig,
}

#[derive(Serialize)]
struct StreamingBody<'a> {
    #[serde(flatten)]
    request: &'a CompletionRequest,
    stream: bool,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn create_stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        if self.config.api_key.is_empty() {
            anyhow::bail!("No OpenAI API key configured");
        }

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            stop = ?request.stop,
            "Opening completion stream"
        );

        let response = self
            .http
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&StreamingBody {
                request: &request,
                stream: true,
            })
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion request failed with {}: {}", status, body);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_sse_stream_task(response.bytes_stream(), tx);
        Ok(rx)
    }
}

/// Spawn a stream processing task for an HTTP SSE response.
///
/// Sends an explicit error part if the stream fails, so the receiver never
/// waits on a silently-dead channel. Stops early once the receiver is gone.
fn spawn_sse_stream_task<S>(stream: S, tx: mpsc::UnboundedSender<StreamPart>)
where
    S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::pin!(stream);
        let mut parser = SseParser::new();
        let mut chunk_count: u64 = 0;

        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    debug!("Completion stream receiver dropped after {} chunks", chunk_count);
                    return;
                }
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            chunk_count += 1;

            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Completion stream read error at chunk #{}: {}", chunk_count, e);
                    let _ = tx.send(StreamPart::Error {
                        error: format!("stream read error: {}", e),
                    });
                    return;
                }
            };

            match parser.push(&bytes) {
                Ok(events) => {
                    for event in events {
                        match event {
                            SseEvent::Chunk(chunk) => {
                                let _ = tx.send(StreamPart::Chunk(chunk));
                            }
                            SseEvent::Done => {
                                info!("Completion stream done after {} chunks", chunk_count);
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("Completion stream chunk #{} parse error: {}", chunk_count, e);
                    let _ = tx.send(StreamPart::Error {
                        error: format!("stream parse error: {}", e),
                    });
                    return;
                }
            }
        }

        match parser.finish() {
            Ok(Some(SseEvent::Chunk(chunk))) => {
                let _ = tx.send(StreamPart::Chunk(chunk));
            }
            Ok(_) => {}
            Err(e) => {
                let _ = tx.send(StreamPart::Error {
                    error: format!("stream parse error: {}", e),
                });
            }
        }
        info!("Completion stream ended after {} chunks", chunk_count);
    });
}
