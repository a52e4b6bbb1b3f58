//! SQLite connection and schema migrations

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;

/// Ordered schema migrations. Each id is applied at most once.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_initial",
        "CREATE TABLE conversation_settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            is_default INTEGER,
            system_prompt_template TEXT NOT NULL,
            tools_enabled TEXT NOT NULL DEFAULT '[]'
        );
        CREATE TABLE conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_settings_id INTEGER NOT NULL
                REFERENCES conversation_settings(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            last_message_time TEXT NOT NULL,
            generating INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL
                REFERENCES conversations(id) ON DELETE CASCADE,
            content TEXT NOT NULL,
            author TEXT NOT NULL
        );
        CREATE INDEX idx_messages_conversation ON messages(conversation_id, id);",
    ),
    (
        "002_key_values",
        "CREATE TABLE key_values (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    ),
    (
        "003_single_default_settings",
        "CREATE UNIQUE INDEX idx_conversation_settings_default
            ON conversation_settings(is_default) WHERE is_default = 1;",
    ),
];

/// Shared SQLite handle.
///
/// Cloning is cheap; all clones use the same connection. The lock is only
/// taken for the duration of a single statement and must never be held
/// across an `.await`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and run pending migrations
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Lock the connection for a single statement
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn migrate(&self) -> Result<()> {
        let mut conn = self.conn();
        conn.execute_batch("CREATE TABLE IF NOT EXISTS migrations (id TEXT PRIMARY KEY)")
            .context("Failed to create migrations table")?;

        for (id, sql) in MIGRATIONS {
            let applied: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM migrations WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            if applied {
                tracing::debug!(migration = id, "Skipping migration, already applied");
                continue;
            }

            tracing::info!(migration = id, "Applying migration");
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .with_context(|| format!("Failed to apply migration {}", id))?;
            tx.execute("INSERT INTO migrations (id) VALUES (?1)", [id])?;
            tx.commit()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::Database;

    #[test]
    fn test_migrations_are_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let _first = Database::new(&db_path).expect("Failed to create database");
        let second = Database::new(&db_path).expect("Failed to reopen database");

        let count: i64 = second
            .conn()
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .expect("Failed to count migrations");
        assert_eq!(count as usize, super::MIGRATIONS.len());
    }
}
