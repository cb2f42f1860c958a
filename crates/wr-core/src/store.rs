//! Append-only conversation log backed by SQLite

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::Result;

/// Append-only logging collaborator.
///
/// Fire-and-forget from the caller's perspective: write failures are
/// reported as errors but must never block message delivery.
pub trait ConversationLog: Send + Sync {
    fn append(&self, sender_id: &str, message: &str, response: &str) -> Result<()>;
}

/// Persists `{sender, message, response, timestamp}` rows in SQLite.
pub struct ConversationStore {
    conn: Mutex<Connection>,
}

impl ConversationStore {
    /// Open (or create) the database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, used by tests
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                user_id   TEXT NOT NULL,
                message   TEXT NOT NULL,
                response  TEXT NOT NULL,
                timestamp DATETIME NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one exchange to the log
    pub fn append(&self, sender_id: &str, message: &str, response: &str) -> Result<()> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute(
            "INSERT INTO conversations (user_id, message, response, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            params![sender_id, message, response, timestamp],
        )?;
        debug!(sender = sender_id, "conversation logged");
        Ok(())
    }

    /// Number of logged exchanges
    pub fn count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let count = conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl ConversationLog for ConversationStore {
    fn append(&self, sender_id: &str, message: &str, response: &str) -> Result<()> {
        ConversationStore::append(self, sender_id, message, response)
    }
}
