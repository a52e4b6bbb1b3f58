//! Conversation and conversation-settings CRUD operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::Database;

/// Conversation metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    #[serde(rename = "conversationSettingsID")]
    pub conversation_settings_id: i64,
    pub title: String,
    pub last_message_time: DateTime<Utc>,
    /// True while an agent run owns this conversation
    pub generating: bool,
}

/// Per-conversation prompt template and enabled tool ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSettings {
    /// `None` for the built-in default that has not been saved yet
    pub id: Option<i64>,
    pub system_prompt_template: String,
    pub tools_enabled: Vec<String>,
}

impl ConversationSettings {
    pub fn is_tool_enabled(&self, tool_id: &str) -> bool {
        self.tools_enabled.iter().any(|t| t == tool_id)
    }
}

/// Conversation store for CRUD operations
pub struct ConversationStore<'a> {
    db: &'a Database,
}

impl<'a> ConversationStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a new conversation
    pub fn create_conversation(&self, settings_id: i64, title: &str) -> Result<Conversation> {
        let now = Utc::now();
        let id = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO conversations (conversation_settings_id, title, last_message_time)
                 VALUES (?1, ?2, ?3)",
                params![settings_id, title, now.to_rfc3339()],
            )?;
            conn.last_insert_rowid()
        };

        Ok(Conversation {
            id,
            conversation_settings_id: settings_id,
            title: title.to_string(),
            last_message_time: now,
            generating: false,
        })
    }

    /// Fetch a conversation by id
    pub fn get_conversation(&self, conversation_id: i64) -> Result<Conversation> {
        self.db
            .conn()
            .query_row(
                "SELECT id, conversation_settings_id, title, last_message_time, generating
                 FROM conversations WHERE id = ?1",
                [conversation_id],
                Self::map_conversation_row,
            )
            .optional()?
            .ok_or_else(|| anyhow::anyhow!("Conversation {} not found", conversation_id))
    }

    /// List conversations, most recently active first
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_settings_id, title, last_message_time, generating
             FROM conversations ORDER BY last_message_time DESC, id DESC",
        )?;
        let conversations = stmt
            .query_map([], Self::map_conversation_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversations)
    }

    /// Delete a conversation and (via cascade) its messages
    pub fn delete_conversation(&self, conversation_id: i64) -> Result<()> {
        let affected = self
            .db
            .conn()
            .execute("DELETE FROM conversations WHERE id = ?1", [conversation_id])?;
        if affected == 0 {
            anyhow::bail!("Conversation {} not found", conversation_id);
        }
        Ok(())
    }

    pub fn mark_generation_started(&self, conversation_id: i64) -> Result<()> {
        self.set_generating(conversation_id, true)
    }

    pub fn mark_generation_done(&self, conversation_id: i64) -> Result<()> {
        self.set_generating(conversation_id, false)
    }

    /// Clear `generating` on every conversation.
    ///
    /// Called at startup: no run survives a restart, so any set flag is stale.
    pub fn clear_stale_generation(&self) -> Result<usize> {
        let cleared = self
            .db
            .conn()
            .execute("UPDATE conversations SET generating = 0 WHERE generating = 1", [])?;
        Ok(cleared)
    }

    fn set_generating(&self, conversation_id: i64, generating: bool) -> Result<()> {
        let affected = self.db.conn().execute(
            "UPDATE conversations SET generating = ?1 WHERE id = ?2",
            params![generating, conversation_id],
        )?;
        if affected == 0 {
            anyhow::bail!("Conversation {} not found", conversation_id);
        }
        Ok(())
    }

    // ── Conversation settings ──────────────────────────────────────────

    pub fn create_conversation_settings(
        &self,
        system_prompt_template: &str,
        tools_enabled: &[String],
    ) -> Result<ConversationSettings> {
        self.insert_settings(system_prompt_template, tools_enabled, false)
    }

    pub fn get_conversation_settings(&self, settings_id: i64) -> Result<ConversationSettings> {
        self.db
            .conn()
            .query_row(
                "SELECT id, system_prompt_template, tools_enabled
                 FROM conversation_settings WHERE id = ?1",
                [settings_id],
                Self::map_settings_row,
            )
            .optional()?
            .ok_or_else(|| anyhow::anyhow!("Conversation settings {} not found", settings_id))
    }

    pub fn update_conversation_settings(
        &self,
        settings_id: i64,
        system_prompt_template: &str,
        tools_enabled: &[String],
    ) -> Result<ConversationSettings> {
        let tools_json = serde_json::to_string(tools_enabled)?;
        let affected = self.db.conn().execute(
            "UPDATE conversation_settings
             SET system_prompt_template = ?1, tools_enabled = ?2
             WHERE id = ?3",
            params![system_prompt_template, tools_json, settings_id],
        )?;
        if affected == 0 {
            anyhow::bail!("Conversation settings {} not found", settings_id);
        }
        self.get_conversation_settings(settings_id)
    }

    /// The stored default settings, if the user ever saved one
    pub fn get_default_conversation_settings(&self) -> Result<Option<ConversationSettings>> {
        let settings = self
            .db
            .conn()
            .query_row(
                "SELECT id, system_prompt_template, tools_enabled
                 FROM conversation_settings WHERE is_default = 1",
                [],
                Self::map_settings_row,
            )
            .optional()?;
        Ok(settings)
    }

    pub fn create_default_conversation_settings(
        &self,
        system_prompt_template: &str,
        tools_enabled: &[String],
    ) -> Result<ConversationSettings> {
        self.insert_settings(system_prompt_template, tools_enabled, true)
    }

    fn insert_settings(
        &self,
        system_prompt_template: &str,
        tools_enabled: &[String],
        is_default: bool,
    ) -> Result<ConversationSettings> {
        let tools_json = serde_json::to_string(tools_enabled)?;
        let id = {
            let conn = self.db.conn();
            conn.execute(
                "INSERT INTO conversation_settings (is_default, system_prompt_template, tools_enabled)
                 VALUES (?1, ?2, ?3)",
                params![is_default.then_some(1), system_prompt_template, tools_json],
            )?;
            conn.last_insert_rowid()
        };

        Ok(ConversationSettings {
            id: Some(id),
            system_prompt_template: system_prompt_template.to_string(),
            tools_enabled: tools_enabled.to_vec(),
        })
    }

    fn map_conversation_row(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
        let last_message_time: String = row.get(3)?;
        Ok(Conversation {
            id: row.get(0)?,
            conversation_settings_id: row.get(1)?,
            title: row.get(2)?,
            last_message_time: DateTime::parse_from_rfc3339(&last_message_time)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            generating: row.get(4)?,
        })
    }

    fn map_settings_row(row: &rusqlite::Row) -> rusqlite::Result<ConversationSettings> {
        let tools_json: String = row.get(2)?;
        let tools_enabled = serde_json::from_str(&tools_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(ConversationSettings {
            id: Some(row.get(0)?),
            system_prompt_template: row.get(1)?,
            tools_enabled,
        })
    }
}
