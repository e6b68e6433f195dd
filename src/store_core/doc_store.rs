//! Keyed writes against the document store.
//!
//! Idempotency contract: the stored `cid` is the version token. Every
//! upsert carries `WHERE <table>.cid IS NOT excluded.cid`, so replaying
//! the same operation changes nothing and reports "not newly applied",
//! which is the signal the applier uses to suppress counter and ledger
//! side effects. Soft deletes flip the lifecycle flag conditionally
//! (`AND deleted = 0`) for the same reason. Upserts never clear the flag;
//! a soft-deleted row keeps its tombstone even if content is refreshed.
//!
//! Counter adjustments are increment-upserts that materialize a stub row
//! (counters only, NULL cid) when the subject post has not been seen yet;
//! the stub is reconciled by the post's own upsert later.

use crate::pipeline::batch::{
    BlockEntity, FeedGeneratorEntity, FollowEntity, LikeEntity, ListEntity, ListItemEntity,
    PostEntity, ProfileEntity, RepostEntity,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Post counters mutated only through atomic increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCounter {
    Likes,
    Reposts,
    Replies,
}

impl PostCounter {
    fn column(&self) -> &'static str {
        match self {
            PostCounter::Likes => "like_count",
            PostCounter::Reposts => "repost_count",
            PostCounter::Replies => "reply_count",
        }
    }
}

/// What a like/repost soft delete needs to report so the applier can
/// compensate counters and the ledger.
#[derive(Debug, Clone)]
pub struct SubjectRef {
    pub author: String,
    pub subject_uri: String,
    pub subject_author: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct PostRow {
    pub cid: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub reply_parent: Option<String>,
    pub quote_uri: Option<String>,
    pub image_count: i64,
    pub alt_text: Option<Vec<String>>,
    pub like_count: i64,
    pub repost_count: i64,
    pub reply_count: i64,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct ActorRow {
    pub cid: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub last_seen: Option<i64>,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct LikeRow {
    pub author: String,
    pub subject_uri: String,
    pub subject_author: Option<String>,
    pub deleted: bool,
}

pub struct DocStore {
    conn: Arc<Mutex<Connection>>,
}

impl DocStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    // -- upserts (return true when newly applied, false on cid replay) ----

    pub fn upsert_profile(&self, profile: &ProfileEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO actors (did, cid, display_name, description, last_seen, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(did) DO UPDATE SET
                cid = excluded.cid,
                display_name = excluded.display_name,
                description = excluded.description
             WHERE actors.cid IS NOT excluded.cid",
            params![
                profile.actor,
                profile.cid,
                profile.display_name,
                profile.description,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_post(&self, post: &PostEntity) -> Result<bool, StoreError> {
        let alt_text = post
            .alt_text
            .as_ref()
            .map(|alts| serde_json::to_string(alts))
            .transpose()?;
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO posts (uri, cid, author, text, created_at, reply_parent, reply_root,
                                quote_uri, image_count, alt_text, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                author = excluded.author,
                text = excluded.text,
                created_at = excluded.created_at,
                reply_parent = excluded.reply_parent,
                reply_root = excluded.reply_root,
                quote_uri = excluded.quote_uri,
                image_count = excluded.image_count,
                alt_text = excluded.alt_text,
                indexed_at = excluded.indexed_at
             WHERE posts.cid IS NOT excluded.cid",
            params![
                post.uri,
                post.cid,
                post.author,
                post.text,
                post.created_at,
                post.reply_parent,
                post.reply_root,
                post.quote_uri,
                post.image_count,
                alt_text,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_like(&self, like: &LikeEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO likes (uri, cid, author, subject_uri, subject_author, created_at, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                subject_uri = excluded.subject_uri,
                subject_author = excluded.subject_author,
                created_at = excluded.created_at
             WHERE likes.cid IS NOT excluded.cid",
            params![
                like.uri,
                like.cid,
                like.author,
                like.subject_uri,
                like.subject_author,
                like.created_at,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_repost(&self, repost: &RepostEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO reposts (uri, cid, author, subject_uri, subject_author, created_at, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                subject_uri = excluded.subject_uri,
                subject_author = excluded.subject_author,
                created_at = excluded.created_at
             WHERE reposts.cid IS NOT excluded.cid",
            params![
                repost.uri,
                repost.cid,
                repost.author,
                repost.subject_uri,
                repost.subject_author,
                repost.created_at,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_follow(&self, follow: &FollowEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO follows (uri, cid, author, subject, created_at, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                subject = excluded.subject,
                created_at = excluded.created_at
             WHERE follows.cid IS NOT excluded.cid",
            params![
                follow.uri,
                follow.cid,
                follow.author,
                follow.subject,
                follow.created_at,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_block(&self, block: &BlockEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO blocks (uri, cid, author, subject, created_at, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                subject = excluded.subject,
                created_at = excluded.created_at
             WHERE blocks.cid IS NOT excluded.cid",
            params![
                block.uri,
                block.cid,
                block.author,
                block.subject,
                block.created_at,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_list(&self, list: &ListEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO lists (uri, cid, author, name, purpose, description, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                name = excluded.name,
                purpose = excluded.purpose,
                description = excluded.description
             WHERE lists.cid IS NOT excluded.cid",
            params![
                list.uri,
                list.cid,
                list.author,
                list.name,
                list.purpose,
                list.description,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_list_item(&self, item: &ListItemEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO list_items (uri, cid, author, subject, list_uri, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                subject = excluded.subject,
                list_uri = excluded.list_uri
             WHERE list_items.cid IS NOT excluded.cid",
            params![
                item.uri,
                item.cid,
                item.author,
                item.subject,
                item.list_uri,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn upsert_feed_generator(&self, gen: &FeedGeneratorEntity) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT INTO feed_generators (uri, cid, author, did, display_name, description, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(uri) DO UPDATE SET
                cid = excluded.cid,
                did = excluded.did,
                display_name = excluded.display_name,
                description = excluded.description
             WHERE feed_generators.cid IS NOT excluded.cid",
            params![
                gen.uri,
                gen.cid,
                gen.author,
                gen.did,
                gen.display_name,
                gen.description,
                Self::now(),
            ],
        )?;
        Ok(changed > 0)
    }

    // -- counters ---------------------------------------------------------

    /// Atomically add `delta` to one post counter, materializing a stub
    /// row when the post is not stored yet. Never reads first.
    pub fn adjust_post_counter(
        &self,
        uri: &str,
        counter: PostCounter,
        delta: i64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO posts (uri, {col}, indexed_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(uri) DO UPDATE SET {col} = {col} + excluded.{col}",
            col = counter.column()
        );
        let conn = self.conn.lock().unwrap();
        conn.execute(&sql, params![uri, delta, Self::now()])?;
        Ok(())
    }

    // -- deletes ----------------------------------------------------------

    /// Soft-delete a post. Returns the reply parent when the flag actually
    /// transitioned, `None` on replay or unknown URI.
    pub fn delete_post(&self, uri: &str) -> Result<Option<Option<String>>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE posts SET deleted = 1 WHERE uri = ?1 AND deleted = 0",
            params![uri],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let reply_parent: Option<String> = conn
            .query_row(
                "SELECT reply_parent FROM posts WHERE uri = ?1",
                params![uri],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(Some(reply_parent))
    }

    /// Soft-delete a like. Returns the stored subject info when the flag
    /// actually transitioned.
    pub fn delete_like(&self, uri: &str) -> Result<Option<SubjectRef>, StoreError> {
        self.delete_subject_record("likes", uri)
    }

    pub fn delete_repost(&self, uri: &str) -> Result<Option<SubjectRef>, StoreError> {
        self.delete_subject_record("reposts", uri)
    }

    fn delete_subject_record(&self, table: &str, uri: &str) -> Result<Option<SubjectRef>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            &format!("UPDATE {table} SET deleted = 1 WHERE uri = ?1 AND deleted = 0"),
            params![uri],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let subject = conn.query_row(
            &format!("SELECT author, subject_uri, subject_author FROM {table} WHERE uri = ?1"),
            params![uri],
            |row| {
                Ok(SubjectRef {
                    author: row.get(0)?,
                    subject_uri: row.get(1)?,
                    subject_author: row.get(2)?,
                })
            },
        )?;
        Ok(Some(subject))
    }

    pub fn delete_actor(&self, did: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE actors SET deleted = 1 WHERE did = ?1 AND deleted = 0",
            params![did],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_block(&self, uri: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE blocks SET deleted = 1 WHERE uri = ?1 AND deleted = 0",
            params![uri],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_list(&self, uri: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE lists SET deleted = 1 WHERE uri = ?1 AND deleted = 0",
            params![uri],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_follow(&self, uri: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM follows WHERE uri = ?1", params![uri])?;
        Ok(changed > 0)
    }

    pub fn delete_list_item(&self, uri: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM list_items WHERE uri = ?1", params![uri])?;
        Ok(changed > 0)
    }

    pub fn delete_feed_generator(&self, uri: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM feed_generators WHERE uri = ?1", params![uri])?;
        Ok(changed > 0)
    }

    // -- actor upkeep -----------------------------------------------------

    /// Refresh `actors.last_seen`, creating a bare row for actors whose
    /// profile has not been ingested.
    pub fn touch_actor(&self, did: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO actors (did, last_seen, indexed_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(did) DO UPDATE SET last_seen = excluded.last_seen",
            params![did, Self::now()],
        )?;
        Ok(())
    }

    // -- reads ------------------------------------------------------------

    pub fn get_post(&self, uri: &str) -> Result<Option<PostRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT cid, author, text, reply_parent, quote_uri, image_count, alt_text,
                        like_count, repost_count, reply_count, deleted
                 FROM posts WHERE uri = ?1",
                params![uri],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, i64>(9)?,
                        row.get::<_, bool>(10)?,
                    ))
                },
            )
            .optional()?;

        let (
            cid,
            author,
            text,
            reply_parent,
            quote_uri,
            image_count,
            alt_json,
            like_count,
            repost_count,
            reply_count,
            deleted,
        ) = match row {
            Some(values) => values,
            None => return Ok(None),
        };

        let alt_text = alt_json
            .map(|json| serde_json::from_str::<Vec<String>>(&json))
            .transpose()?;

        Ok(Some(PostRow {
            cid,
            author,
            text,
            reply_parent,
            quote_uri,
            image_count,
            alt_text,
            like_count,
            repost_count,
            reply_count,
            deleted,
        }))
    }

    pub fn get_actor(&self, did: &str) -> Result<Option<ActorRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT cid, display_name, description, last_seen, deleted
                 FROM actors WHERE did = ?1",
                params![did],
                |row| {
                    Ok(ActorRow {
                        cid: row.get(0)?,
                        display_name: row.get(1)?,
                        description: row.get(2)?,
                        last_seen: row.get(3)?,
                        deleted: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_like(&self, uri: &str) -> Result<Option<LikeRow>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT author, subject_uri, subject_author, deleted FROM likes WHERE uri = ?1",
                params![uri],
                |row| {
                    Ok(LikeRow {
                        author: row.get(0)?,
                        subject_uri: row.get(1)?,
                        subject_author: row.get(2)?,
                        deleted: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn follow_exists(&self, uri: &str) -> Result<bool, StoreError> {
        self.uri_exists("follows", uri)
    }

    pub fn list_item_exists(&self, uri: &str) -> Result<bool, StoreError> {
        self.uri_exists("list_items", uri)
    }

    pub fn feed_generator_exists(&self, uri: &str) -> Result<bool, StoreError> {
        self.uri_exists("feed_generators", uri)
    }

    fn uri_exists(&self, table: &str, uri: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE uri = ?1"),
            params![uri],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_core::schema::run_migrations;

    fn test_store() -> DocStore {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        DocStore::new(Arc::new(Mutex::new(conn)))
    }

    fn post(uri: &str, cid: &str) -> PostEntity {
        PostEntity {
            uri: uri.to_string(),
            cid: cid.to_string(),
            author: "did:plc:alice".to_string(),
            text: "hello".to_string(),
            created_at: Some("2024-05-01T12:00:00Z".to_string()),
            reply_parent: None,
            reply_root: None,
            quote_uri: None,
            image_count: 0,
            alt_text: None,
        }
    }

    #[test]
    fn test_post_upsert_reports_replay() {
        let store = test_store();
        let p = post("at://did:plc:alice/app.bsky.feed.post/1", "bafy1");

        assert!(store.upsert_post(&p).unwrap());
        // Same cid again: replayed operation
        assert!(!store.upsert_post(&p).unwrap());

        // New cid: a real new version
        let mut p2 = p.clone();
        p2.cid = "bafy2".to_string();
        p2.text = "hello again".to_string();
        assert!(store.upsert_post(&p2).unwrap());

        let row = store.get_post(&p.uri).unwrap().unwrap();
        assert_eq!(row.text.as_deref(), Some("hello again"));
    }

    #[test]
    fn test_counter_adjustment_creates_stub_then_reconciles() {
        let store = test_store();
        let uri = "at://did:plc:alice/app.bsky.feed.post/1";

        store.adjust_post_counter(uri, PostCounter::Likes, 1).unwrap();
        store.adjust_post_counter(uri, PostCounter::Likes, 1).unwrap();

        let stub = store.get_post(uri).unwrap().unwrap();
        assert_eq!(stub.like_count, 2);
        assert!(stub.cid.is_none());

        // The post create arrives late and fills in content, keeping counters
        assert!(store.upsert_post(&post(uri, "bafy1")).unwrap());
        let row = store.get_post(uri).unwrap().unwrap();
        assert_eq!(row.like_count, 2);
        assert_eq!(row.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_upsert_preserves_counters() {
        let store = test_store();
        let uri = "at://did:plc:alice/app.bsky.feed.post/1";
        store.upsert_post(&post(uri, "bafy1")).unwrap();
        store.adjust_post_counter(uri, PostCounter::Reposts, 3).unwrap();

        let mut edited = post(uri, "bafy2");
        edited.text = "edited".to_string();
        store.upsert_post(&edited).unwrap();

        let row = store.get_post(uri).unwrap().unwrap();
        assert_eq!(row.repost_count, 3);
        assert_eq!(row.text.as_deref(), Some("edited"));
    }

    #[test]
    fn test_soft_delete_transitions_once() {
        let store = test_store();
        let uri = "at://did:plc:alice/app.bsky.feed.post/1";
        let mut p = post(uri, "bafy1");
        p.reply_parent = Some("at://did:plc:bob/app.bsky.feed.post/parent".to_string());
        store.upsert_post(&p).unwrap();

        let first = store.delete_post(uri).unwrap();
        assert_eq!(
            first,
            Some(Some(
                "at://did:plc:bob/app.bsky.feed.post/parent".to_string()
            ))
        );
        // Replayed delete: no transition
        assert_eq!(store.delete_post(uri).unwrap(), None);
        // Unknown URI: no transition
        assert_eq!(store.delete_post("at://nope/app.bsky.feed.post/x").unwrap(), None);

        let row = store.get_post(uri).unwrap().unwrap();
        assert!(row.deleted);
    }

    #[test]
    fn test_upsert_does_not_resurrect_soft_deleted_row() {
        let store = test_store();
        let uri = "at://did:plc:alice/app.bsky.feed.post/1";
        store.upsert_post(&post(uri, "bafy1")).unwrap();
        store.delete_post(uri).unwrap();

        store.upsert_post(&post(uri, "bafy2")).unwrap();
        let row = store.get_post(uri).unwrap().unwrap();
        assert!(row.deleted);
    }

    #[test]
    fn test_like_delete_returns_subject_info() {
        let store = test_store();
        let like = LikeEntity {
            uri: "at://did:plc:alice/app.bsky.feed.like/1".to_string(),
            cid: "bafyl".to_string(),
            author: "did:plc:alice".to_string(),
            subject_uri: "at://did:plc:bob/app.bsky.feed.post/p1".to_string(),
            subject_author: Some("did:plc:bob".to_string()),
            created_at: None,
        };
        assert!(store.upsert_like(&like).unwrap());
        assert!(!store.upsert_like(&like).unwrap());

        let info = store.delete_like(&like.uri).unwrap().unwrap();
        assert_eq!(info.author, "did:plc:alice");
        assert_eq!(info.subject_uri, "at://did:plc:bob/app.bsky.feed.post/p1");
        assert_eq!(info.subject_author.as_deref(), Some("did:plc:bob"));

        assert!(store.delete_like(&like.uri).unwrap().is_none());
        assert!(store.get_like(&like.uri).unwrap().unwrap().deleted);
    }

    #[test]
    fn test_follow_hard_delete_removes_row() {
        let store = test_store();
        let follow = FollowEntity {
            uri: "at://did:plc:alice/app.bsky.graph.follow/1".to_string(),
            cid: "bafyf".to_string(),
            author: "did:plc:alice".to_string(),
            subject: "did:plc:bob".to_string(),
            created_at: None,
        };
        store.upsert_follow(&follow).unwrap();
        assert!(store.follow_exists(&follow.uri).unwrap());

        assert!(store.delete_follow(&follow.uri).unwrap());
        assert!(!store.follow_exists(&follow.uri).unwrap());
        // Replayed delete: nothing to remove
        assert!(!store.delete_follow(&follow.uri).unwrap());
    }

    #[test]
    fn test_profile_upsert_over_touched_actor() {
        let store = test_store();
        store.touch_actor("did:plc:alice").unwrap();

        let profile = ProfileEntity {
            uri: "at://did:plc:alice/app.bsky.actor.profile/self".to_string(),
            cid: "bafyp".to_string(),
            actor: "did:plc:alice".to_string(),
            display_name: Some("Alice".to_string()),
            description: None,
        };
        assert!(store.upsert_profile(&profile).unwrap());
        assert!(!store.upsert_profile(&profile).unwrap());

        let actor = store.get_actor("did:plc:alice").unwrap().unwrap();
        assert_eq!(actor.display_name.as_deref(), Some("Alice"));
        assert!(actor.last_seen.is_some());
    }

    #[test]
    fn test_alt_text_round_trips_as_json() {
        let store = test_store();
        let uri = "at://did:plc:alice/app.bsky.feed.post/1";
        let mut p = post(uri, "bafy1");
        p.image_count = 2;
        p.alt_text = Some(vec!["a cat".to_string(), String::new()]);
        store.upsert_post(&p).unwrap();

        let row = store.get_post(uri).unwrap().unwrap();
        assert_eq!(row.image_count, 2);
        assert_eq!(
            row.alt_text,
            Some(vec!["a cat".to_string(), String::new()])
        );
    }
}
