//! Embedded schema for the document store.
//!
//! Every statement is idempotent (`IF NOT EXISTS`), so migrations run
//! unconditionally at startup. Entity tables are keyed by the stable
//! `at://` record URI; actors are keyed by DID. Post rows may exist as
//! counter-only stubs (NULL cid/author) created by counter adjustments
//! that arrived before the post itself.

use crate::store_core::doc_store::StoreError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Open the database, apply pragmas and run migrations.
pub fn open_database(db_path: impl AsRef<Path>) -> Result<Arc<Mutex<Connection>>, StoreError> {
    if let Some(parent) = db_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    run_migrations(&conn)?;

    log::info!("✅ Document store initialized with WAL mode");

    Ok(Arc::new(Mutex::new(conn)))
}

pub fn run_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS actors (
            did           TEXT PRIMARY KEY,
            cid           TEXT,
            display_name  TEXT,
            description   TEXT,
            last_seen     INTEGER,
            deleted       INTEGER NOT NULL DEFAULT 0,
            indexed_at    INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS posts (
            uri           TEXT PRIMARY KEY,
            cid           TEXT,
            author        TEXT,
            text          TEXT,
            created_at    TEXT,
            reply_parent  TEXT,
            reply_root    TEXT,
            quote_uri     TEXT,
            image_count   INTEGER NOT NULL DEFAULT 0,
            alt_text      TEXT,
            like_count    INTEGER NOT NULL DEFAULT 0,
            repost_count  INTEGER NOT NULL DEFAULT 0,
            reply_count   INTEGER NOT NULL DEFAULT 0,
            deleted       INTEGER NOT NULL DEFAULT 0,
            indexed_at    INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS likes (
            uri             TEXT PRIMARY KEY,
            cid             TEXT NOT NULL,
            author          TEXT NOT NULL,
            subject_uri     TEXT NOT NULL,
            subject_author  TEXT,
            created_at      TEXT,
            deleted         INTEGER NOT NULL DEFAULT 0,
            indexed_at      INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reposts (
            uri             TEXT PRIMARY KEY,
            cid             TEXT NOT NULL,
            author          TEXT NOT NULL,
            subject_uri     TEXT NOT NULL,
            subject_author  TEXT,
            created_at      TEXT,
            deleted         INTEGER NOT NULL DEFAULT 0,
            indexed_at      INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS follows (
            uri         TEXT PRIMARY KEY,
            cid         TEXT NOT NULL,
            author      TEXT NOT NULL,
            subject     TEXT NOT NULL,
            created_at  TEXT,
            indexed_at  INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS blocks (
            uri         TEXT PRIMARY KEY,
            cid         TEXT NOT NULL,
            author      TEXT NOT NULL,
            subject     TEXT NOT NULL,
            created_at  TEXT,
            deleted     INTEGER NOT NULL DEFAULT 0,
            indexed_at  INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lists (
            uri          TEXT PRIMARY KEY,
            cid          TEXT NOT NULL,
            author       TEXT NOT NULL,
            name         TEXT NOT NULL,
            purpose      TEXT,
            description  TEXT,
            deleted      INTEGER NOT NULL DEFAULT 0,
            indexed_at   INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS list_items (
            uri         TEXT PRIMARY KEY,
            cid         TEXT NOT NULL,
            author      TEXT NOT NULL,
            subject     TEXT NOT NULL,
            list_uri    TEXT NOT NULL,
            indexed_at  INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feed_generators (
            uri           TEXT PRIMARY KEY,
            cid           TEXT NOT NULL,
            author        TEXT NOT NULL,
            did           TEXT NOT NULL,
            display_name  TEXT,
            description   TEXT,
            indexed_at    INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS interaction_buckets (
            author      TEXT NOT NULL,
            subject     TEXT NOT NULL,
            day         TEXT NOT NULL,
            characters  INTEGER NOT NULL DEFAULT 0,
            replies     INTEGER NOT NULL DEFAULT 0,
            likes       INTEGER NOT NULL DEFAULT 0,
            reposts     INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (author, subject, day)
        )",
        [],
    )?;

    // Indexes for the lookups this pipeline and its readers perform
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author, indexed_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_posts_reply_parent ON posts(reply_parent)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_likes_subject ON likes(subject_uri)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reposts_subject ON reposts(subject_uri)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_follows_subject ON follows(subject)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_list_items_list ON list_items(list_uri)",
        [],
    )?;

    Ok(())
}
