//! Stream processing for the agent loop.
//!
//! Drains a completion stream into a persisted assistant message:
//! - Appends each delta as it arrives and notifies listeners
//! - Stops on cancellation
//! - Fails on stream errors and on 120s without data

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{persistence, GenerationError};
use super::events::{emit, AppEvent, EventSender};
use crate::ai::client::CompletionStream;
use crate::ai::types::StreamPart;
use crate::storage::{Database, MessageStore};

pub(crate) const STREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Where accumulated text goes
pub(crate) struct StreamTarget<'a> {
    pub db: &'a Database,
    pub events: &'a EventSender,
    pub conversation_id: i64,
    pub message_id: i64,
}

/// Consume the stream until it closes. Returns the number of deltas applied.
pub(crate) async fn accumulate_stream(
    mut stream: CompletionStream,
    target: StreamTarget<'_>,
    cancel: &CancellationToken,
) -> Result<usize, GenerationError> {
    let mut deltas = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            next = tokio::time::timeout(STREAM_TIMEOUT, stream.recv()) => next,
        };

        let part = match next {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(_) => {
                warn!(
                    conversation_id = target.conversation_id,
                    "Completion stream timed out"
                );
                return Err(GenerationError::Transport(anyhow::anyhow!(
                    "no data received for {} seconds",
                    STREAM_TIMEOUT.as_secs()
                )));
            }
        };

        match part {
            StreamPart::Chunk(chunk) => {
                let Some(text) = chunk.first_delta_text() else {
                    continue;
                };
                MessageStore::new(target.db)
                    .append_to_message(target.message_id, text)
                    .map_err(persistence("couldn't append to assistant message"))?;
                deltas += 1;
                emit(
                    target.events,
                    AppEvent::ConversationUpdated {
                        conversation_id: target.conversation_id,
                    },
                );
            }
            StreamPart::Error { error } => {
                return Err(GenerationError::Transport(anyhow::anyhow!(error)));
            }
        }
    }

    debug!(
        conversation_id = target.conversation_id,
        deltas, "Completion stream finished"
    );
    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use super::*;
    use crate::ai::types::CompletionChunk;
    use crate::storage::{ConversationStore, AUTHOR_ASSISTANT};

    fn setup() -> (Database, i64, i64, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
        let store = ConversationStore::new(&db);
        let settings = store.create_conversation_settings("t", &[]).unwrap();
        let conversation = store
            .create_conversation(settings.id.unwrap(), "Chat")
            .unwrap();
        let message = MessageStore::new(&db)
            .create_message(conversation.id, AUTHOR_ASSISTANT, "")
            .unwrap();
        (db, conversation.id, message.id, temp_dir)
    }

    fn chunk(text: &str) -> StreamPart {
        StreamPart::Chunk(CompletionChunk::text(text))
    }

    #[tokio::test]
    async fn test_appends_deltas_and_skips_empty_choices() {
        let (db, conversation_id, message_id, _temp) = setup();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(chunk("Hel")).unwrap();
        tx.send(StreamPart::Chunk(CompletionChunk::default())).unwrap();
        tx.send(chunk("lo")).unwrap();
        drop(tx);

        let target = StreamTarget {
            db: &db,
            events: &events_tx,
            conversation_id,
            message_id,
        };
        let deltas = accumulate_stream(rx, target, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(deltas, 2);
        let message = MessageStore::new(&db).get_message(message_id).unwrap();
        assert_eq!(message.content, "Hello");

        let mut updates = 0;
        while events_rx.try_recv().is_ok() {
            updates += 1;
        }
        assert_eq!(updates, 2);
    }

    #[tokio::test]
    async fn test_stream_error_is_transport_error() {
        let (db, conversation_id, message_id, _temp) = setup();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(chunk("partial")).unwrap();
        tx.send(StreamPart::Error {
            error: "connection reset".to_string(),
        })
        .unwrap();

        let target = StreamTarget {
            db: &db,
            events: &events_tx,
            conversation_id,
            message_id,
        };
        let err = accumulate_stream(rx, target, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_cancel_stops_open_stream() {
        let (db, conversation_id, message_id, _temp) = setup();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (_tx, rx) = mpsc::unbounded_channel::<StreamPart>();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let target = StreamTarget {
            db: &db,
            events: &events_tx,
            conversation_id,
            message_id,
        };
        let err = accumulate_stream(rx, target, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_times_out() {
        let (db, conversation_id, message_id, _temp) = setup();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (_tx, rx) = mpsc::unbounded_channel::<StreamPart>();

        let target = StreamTarget {
            db: &db,
            events: &events_tx,
            conversation_id,
            message_id,
        };
        let err = accumulate_stream(rx, target, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }
}
