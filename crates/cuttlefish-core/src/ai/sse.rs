//! Server-sent events line parsing for OpenAI-compatible streams

use anyhow::{Context, Result};

use super::types::CompletionChunk;

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

/// Parsed SSE payload
#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Chunk(CompletionChunk),
    Done,
}

/// Accumulates raw bytes and yields complete `data:` events.
///
/// Bytes are buffered until a newline so multi-byte characters split across
/// network chunks decode correctly.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = std::str::from_utf8(&line).context("SSE line is not valid UTF-8")?;
            if let Some(event) = parse_line(line.trim_end_matches(['\r', '\n']))? {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Result<Option<SseEvent>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let line = std::mem::take(&mut self.buffer);
        let line = String::from_utf8(line).context("SSE line is not valid UTF-8")?;
        parse_line(line.trim_end())
    }
}

fn parse_line(line: &str) -> Result<Option<SseEvent>> {
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        // Comments, event names and blank separators carry nothing for us
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_MARKER {
        return Ok(Some(SseEvent::Done));
    }
    let chunk: CompletionChunk =
        serde_json::from_str(data).with_context(|| format!("Invalid stream chunk: {}", data))?;
    Ok(Some(SseEvent::Chunk(chunk)))
}
