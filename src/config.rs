//! Runtime configuration from environment variables.

use std::env;
use std::time::Duration;

/// Configuration for the ingest runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Path to the SQLite database file (entities, ledger, cursors)
    pub db_path: String,

    /// Stream name owning the checkpoint cursor
    pub stream_name: String,

    /// When set, replay commits from this JSONL capture instead of a
    /// live source
    pub replay_path: Option<String>,

    /// Fixed delay between reconnect attempts
    pub reconnect_delay_secs: u64,

    /// Buffer size of each fanout consumer channel (batches)
    pub channel_buffer: usize,

    /// Enable the JSONL archive consumer
    pub enable_archive: bool,

    /// Archive file path
    pub archive_path: String,

    /// Archive rotation threshold in megabytes
    pub archive_max_size_mb: u64,

    /// How many rotated archive files to keep
    pub archive_max_rotations: u32,

    /// How long an actor's `last_seen` touch stays fresh
    pub actor_cache_ttl_secs: u64,
}

impl IngestConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SKYFLOW_DB_PATH` (default: /var/lib/skyflow/skyflow.db)
    /// - `SKYFLOW_STREAM_NAME` (default: firehose)
    /// - `SKYFLOW_REPLAY_PATH` (default: unset, live source)
    /// - `RECONNECT_DELAY_SECS` (default: 5)
    /// - `BATCH_CHANNEL_BUFFER` (default: 1024)
    /// - `ENABLE_ARCHIVE_JSONL` (default: false)
    /// - `ARCHIVE_JSONL_PATH` (default: /var/lib/skyflow/archive.jsonl)
    /// - `ARCHIVE_MAX_SIZE_MB` (default: 256)
    /// - `ARCHIVE_MAX_ROTATIONS` (default: 5)
    /// - `ACTOR_CACHE_TTL_SECS` (default: 86400)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("SKYFLOW_DB_PATH")
                .unwrap_or_else(|_| "/var/lib/skyflow/skyflow.db".to_string()),

            stream_name: env::var("SKYFLOW_STREAM_NAME")
                .unwrap_or_else(|_| "firehose".to_string()),

            replay_path: env::var("SKYFLOW_REPLAY_PATH").ok().filter(|p| !p.is_empty()),

            reconnect_delay_secs: env::var("RECONNECT_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),

            channel_buffer: env::var("BATCH_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024),

            enable_archive: env::var("ENABLE_ARCHIVE_JSONL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),

            archive_path: env::var("ARCHIVE_JSONL_PATH")
                .unwrap_or_else(|_| "/var/lib/skyflow/archive.jsonl".to_string()),

            archive_max_size_mb: env::var("ARCHIVE_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),

            archive_max_rotations: env::var("ARCHIVE_MAX_ROTATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),

            actor_cache_ttl_secs: env::var("ACTOR_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(86_400),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn actor_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.actor_cache_ttl_secs)
    }
}
