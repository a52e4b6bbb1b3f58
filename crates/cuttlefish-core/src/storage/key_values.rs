//! Key-value storage for application-wide blobs (settings)

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::database::Database;

pub struct KeyValueStore<'a> {
    db: &'a Database,
}

impl<'a> KeyValueStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .db
            .conn()
            .query_row("SELECT value FROM key_values WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Insert or replace a value
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.db.conn().execute(
            "INSERT INTO key_values (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
