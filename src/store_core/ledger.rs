//! Pairwise daily interaction ledger.
//!
//! One row per (author, subject, day) holding additive counters. The
//! increment-or-create is a single conditional upsert, so concurrent
//! writers can never lose an update and a bucket can never be duplicated;
//! the composite primary key is the uniqueness guarantee. Buckets are
//! created lazily and never deleted here; decrements compensate earlier
//! increments and the applier only issues them on observed lifecycle
//! transitions.

use crate::store_core::doc_store::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Counter changes for one interaction. Any subset may be non-zero, and
/// values may be negative (compensation for an undone interaction).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionDelta {
    pub characters: i64,
    pub replies: i64,
    pub likes: i64,
    pub reposts: i64,
}

impl InteractionDelta {
    pub fn like() -> Self {
        Self {
            likes: 1,
            ..Self::default()
        }
    }

    pub fn unlike() -> Self {
        Self {
            likes: -1,
            ..Self::default()
        }
    }

    pub fn repost() -> Self {
        Self {
            reposts: 1,
            ..Self::default()
        }
    }

    pub fn unrepost() -> Self {
        Self {
            reposts: -1,
            ..Self::default()
        }
    }

    pub fn reply(characters: i64) -> Self {
        Self {
            replies: 1,
            characters,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// One materialized bucket, as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyBucket {
    pub day: String,
    pub characters: i64,
    pub replies: i64,
    pub likes: i64,
    pub reposts: i64,
}

/// Store-local calendar day used for bucketing, `YYYY-MM-DD`.
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

pub struct InteractionLedger {
    conn: Arc<Mutex<Connection>>,
}

impl InteractionLedger {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Apply `delta` to the (author, subject, day) bucket, creating it if
    /// absent. Self-interactions are a silent no-op.
    pub fn record(
        &self,
        author: &str,
        subject: &str,
        day: &str,
        delta: InteractionDelta,
    ) -> Result<(), StoreError> {
        if author == subject {
            log::debug!("Ignoring self-interaction for {}", author);
            return Ok(());
        }
        if delta.is_zero() {
            return Ok(());
        }

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO interaction_buckets (author, subject, day, characters, replies, likes, reposts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(author, subject, day) DO UPDATE SET
                characters = characters + excluded.characters,
                replies = replies + excluded.replies,
                likes = likes + excluded.likes,
                reposts = reposts + excluded.reposts",
            params![
                author,
                subject,
                day,
                delta.characters,
                delta.replies,
                delta.likes,
                delta.reposts,
            ],
        )?;
        Ok(())
    }

    /// All buckets for one directed pair, ordered by day.
    pub fn partition(&self, author: &str, subject: &str) -> Result<Vec<DailyBucket>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT day, characters, replies, likes, reposts
             FROM interaction_buckets
             WHERE author = ?1 AND subject = ?2
             ORDER BY day ASC",
        )?;
        let buckets = stmt
            .query_map(params![author, subject], |row| {
                Ok(DailyBucket {
                    day: row.get(0)?,
                    characters: row.get(1)?,
                    replies: row.get(2)?,
                    likes: row.get(3)?,
                    reposts: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buckets)
    }

    pub fn bucket(
        &self,
        author: &str,
        subject: &str,
        day: &str,
    ) -> Result<Option<DailyBucket>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let bucket = conn
            .query_row(
                "SELECT day, characters, replies, likes, reposts
                 FROM interaction_buckets
                 WHERE author = ?1 AND subject = ?2 AND day = ?3",
                params![author, subject, day],
                |row| {
                    Ok(DailyBucket {
                        day: row.get(0)?,
                        characters: row.get(1)?,
                        replies: row.get(2)?,
                        likes: row.get(3)?,
                        reposts: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_core::schema::run_migrations;

    fn test_ledger() -> InteractionLedger {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        InteractionLedger::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_increment_creates_bucket_lazily() {
        let ledger = test_ledger();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-01", InteractionDelta::like())
            .unwrap();

        let bucket = ledger
            .bucket("did:plc:alice", "did:plc:bob", "2024-05-01")
            .unwrap()
            .unwrap();
        assert_eq!(bucket.likes, 1);
        assert_eq!(bucket.replies, 0);
    }

    #[test]
    fn test_same_day_increments_accumulate_in_one_bucket() {
        let ledger = test_ledger();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-01", InteractionDelta::reply(5))
            .unwrap();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-01", InteractionDelta::reply(7))
            .unwrap();

        let buckets = ledger.partition("did:plc:alice", "did:plc:bob").unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].replies, 2);
        assert_eq!(buckets[0].characters, 12);
    }

    #[test]
    fn test_days_partition_into_separate_buckets() {
        let ledger = test_ledger();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-02", InteractionDelta::like())
            .unwrap();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-01", InteractionDelta::repost())
            .unwrap();

        let buckets = ledger.partition("did:plc:alice", "did:plc:bob").unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].day, "2024-05-01");
        assert_eq!(buckets[0].reposts, 1);
        assert_eq!(buckets[1].day, "2024-05-02");
        assert_eq!(buckets[1].likes, 1);
    }

    #[test]
    fn test_direction_matters() {
        let ledger = test_ledger();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-01", InteractionDelta::like())
            .unwrap();

        assert!(ledger
            .bucket("did:plc:bob", "did:plc:alice", "2024-05-01")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_self_interaction_is_silent_noop() {
        let ledger = test_ledger();
        ledger
            .record("did:plc:alice", "did:plc:alice", "2024-05-01", InteractionDelta::like())
            .unwrap();

        assert!(ledger
            .bucket("did:plc:alice", "did:plc:alice", "2024-05-01")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decrement_compensates_increment() {
        let ledger = test_ledger();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-01", InteractionDelta::like())
            .unwrap();
        ledger
            .record("did:plc:alice", "did:plc:bob", "2024-05-01", InteractionDelta::unlike())
            .unwrap();

        let bucket = ledger
            .bucket("did:plc:alice", "did:plc:bob", "2024-05-01")
            .unwrap()
            .unwrap();
        assert_eq!(bucket.likes, 0);
    }

    #[test]
    fn test_concurrent_increments_sum_exactly() {
        let ledger = Arc::new(test_ledger());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for _ in 0..5 {
                    ledger
                        .record(
                            "did:plc:alice",
                            "did:plc:bob",
                            "2024-05-01",
                            InteractionDelta::like(),
                        )
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let buckets = ledger.partition("did:plc:alice", "did:plc:bob").unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].likes, 40);
    }

    #[test]
    fn test_today_format() {
        let day = today();
        assert_eq!(day.len(), 10);
        assert_eq!(day.as_bytes()[4], b'-');
        assert_eq!(day.as_bytes()[7], b'-');
    }
}
