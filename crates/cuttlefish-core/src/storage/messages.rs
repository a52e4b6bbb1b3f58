//! Message persistence storage
//!
//! Messages are ordered by id within a conversation; that order is the
//! order the prompt is rebuilt in.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::Database;

/// Author tag for messages typed by the user
pub const AUTHOR_USER: &str = "user";
/// Author tag for model output
pub const AUTHOR_ASSISTANT: &str = "assistant";

/// A single conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    #[serde(rename = "conversationID")]
    pub conversation_id: i64,
    pub content: String,
    /// `user`, `assistant`, or a tool's display name
    pub author: String,
}

/// Message persistence store
pub struct MessageStore<'a> {
    db: &'a Database,
}

impl<'a> MessageStore<'a> {
    /// Create a new message store with database reference
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a message and bump the conversation's last activity time
    pub fn create_message(
        &self,
        conversation_id: i64,
        author: &str,
        content: &str,
    ) -> Result<Message> {
        let now = Utc::now().to_rfc3339();
        let id = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO messages (conversation_id, content, author) VALUES (?1, ?2, ?3)",
                params![conversation_id, content, author],
            )?;
            let id = conn.last_insert_rowid();
            conn.execute(
                "UPDATE conversations SET last_message_time = ?1 WHERE id = ?2",
                params![now, conversation_id],
            )?;
            id
        };

        Ok(Message {
            id,
            conversation_id,
            content: content.to_string(),
            author: author.to_string(),
        })
    }

    /// Append streamed text to a message's content
    pub fn append_to_message(&self, message_id: i64, delta: &str) -> Result<()> {
        let affected = self.db.conn().execute(
            "UPDATE messages SET content = content || ?1 WHERE id = ?2",
            params![delta, message_id],
        )?;
        if affected == 0 {
            anyhow::bail!("Message {} not found", message_id);
        }
        Ok(())
    }

    /// Fetch a single message
    pub fn get_message(&self, message_id: i64) -> Result<Message> {
        self.db
            .conn()
            .query_row(
                "SELECT id, conversation_id, content, author FROM messages WHERE id = ?1",
                [message_id],
                Self::map_message_row,
            )
            .optional()?
            .ok_or_else(|| anyhow::anyhow!("Message {} not found", message_id))
    }

    /// Load all messages of a conversation in creation order
    pub fn list_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, content, author FROM messages
             WHERE conversation_id = ?1 ORDER BY id",
        )?;
        let messages = stmt
            .query_map([conversation_id], Self::map_message_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Delete every message that follows `message_id` in the conversation
    ///
    /// The message itself is kept so a run can regenerate the turns after it.
    pub fn reset_conversation_from(&self, conversation_id: i64, message_id: i64) -> Result<usize> {
        let deleted = self.db.conn().execute(
            "DELETE FROM messages WHERE conversation_id = ?1 AND id > ?2",
            params![conversation_id, message_id],
        )?;
        Ok(deleted)
    }

    fn map_message_row(row: &rusqlite::Row) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            content: row.get(2)?,
            author: row.get(3)?,
        })
    }
}
