//! Checkpoint persistence for subscription cursors.
//!
//! One row per stream name holding the last durably committed sequence.
//! The consumer writes at a fixed cadence (every N events, not every
//! event), so resumption is at-least-once by contract: a restart may
//! replay up to N-1 already-handled events.

use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

type CheckpointResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Last persisted sequence for `stream`, if any.
    async fn get_cursor(&self, stream: &str) -> CheckpointResult<Option<i64>>;

    /// Persist `sequence` for `stream`, overwriting the previous value.
    async fn set_cursor(&self, stream: &str, sequence: i64) -> CheckpointResult<()>;
}

/// SQLite-backed checkpoint store.
pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// Open (or create) the checkpoint table at `db_path`.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Share an already-open connection (the runtime opens one database
    /// for cursors and entities alike).
    pub fn with_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, rusqlite::Error> {
        {
            let guard = conn.lock().unwrap();
            Self::init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS stream_cursors (
                stream      TEXT PRIMARY KEY,
                sequence    INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get_cursor(&self, stream: &str) -> CheckpointResult<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT sequence FROM stream_cursors WHERE stream = ?1")?;
        let cursor = stmt
            .query_row([stream], |row| row.get::<_, i64>(0))
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(cursor)
    }

    async fn set_cursor(&self, stream: &str, sequence: i64) -> CheckpointResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO stream_cursors (stream, sequence, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(stream) DO UPDATE SET
                sequence = excluded.sequence,
                updated_at = excluded.updated_at",
            rusqlite::params![stream, sequence, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }
}

/// In-memory checkpoint store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    cursors: Mutex<HashMap<String, i64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get_cursor(&self, stream: &str) -> CheckpointResult<Option<i64>> {
        Ok(self.cursors.lock().unwrap().get(stream).copied())
    }

    async fn set_cursor(&self, stream: &str, sequence: i64) -> CheckpointResult<()> {
        self.cursors
            .lock()
            .unwrap()
            .insert(stream.to_string(), sequence);
        Ok(())
    }
}
