#[cfg(test)]
mod tests {
    use {
        crate::firehose_core::{
            CheckpointStore, CommitEvent, MemorySource, OpAction, RepoOp, SqliteCheckpointStore,
            SubscriptionConsumer,
        },
        crate::pipeline::{classify, FanoutDistributor, FanoutHandler},
        crate::store_core::{open_database, today, DocStore, EntityApplier, InteractionLedger},
        std::sync::Arc,
        std::time::Duration,
    };

    fn post_event(sequence: i64, repo: &str, rkey: &str, text: &str) -> CommitEvent {
        CommitEvent {
            sequence,
            repo: repo.to_string(),
            operations: vec![RepoOp {
                action: OpAction::Create,
                path: format!("app.bsky.feed.post/{}", rkey),
                record: Some(serde_json::json!({
                    "text": text,
                    "createdAt": "2024-06-01T12:00:00Z",
                })),
                cid: Some(format!("bafy{}", sequence)),
            }],
        }
    }

    fn reply_event(
        sequence: i64,
        repo: &str,
        rkey: &str,
        text: &str,
        parent_uri: &str,
    ) -> CommitEvent {
        CommitEvent {
            sequence,
            repo: repo.to_string(),
            operations: vec![RepoOp {
                action: OpAction::Create,
                path: format!("app.bsky.feed.post/{}", rkey),
                record: Some(serde_json::json!({
                    "text": text,
                    "reply": {
                        "parent": { "uri": parent_uri },
                        "root": { "uri": parent_uri },
                    },
                })),
                cid: Some(format!("bafy{}", sequence)),
            }],
        }
    }

    fn like_event(sequence: i64, repo: &str, rkey: &str, subject_uri: &str) -> CommitEvent {
        CommitEvent {
            sequence,
            repo: repo.to_string(),
            operations: vec![RepoOp {
                action: OpAction::Create,
                path: format!("app.bsky.feed.like/{}", rkey),
                record: Some(serde_json::json!({
                    "subject": { "uri": subject_uri, "cid": "bafysubject" },
                })),
                cid: Some(format!("bafy{}", sequence)),
            }],
        }
    }

    fn repost_event(sequence: i64, repo: &str, rkey: &str, subject_uri: &str) -> CommitEvent {
        CommitEvent {
            sequence,
            repo: repo.to_string(),
            operations: vec![RepoOp {
                action: OpAction::Create,
                path: format!("app.bsky.feed.repost/{}", rkey),
                record: Some(serde_json::json!({
                    "subject": { "uri": subject_uri, "cid": "bafysubject" },
                })),
                cid: Some(format!("bafy{}", sequence)),
            }],
        }
    }

    fn delete_event(sequence: i64, repo: &str, path: &str) -> CommitEvent {
        CommitEvent {
            sequence,
            repo: repo.to_string(),
            operations: vec![RepoOp {
                action: OpAction::Delete,
                path: path.to_string(),
                record: None,
                cid: None,
            }],
        }
    }

    /// Replaying already-applied events after a crash/restart must leave
    /// documents and interaction buckets exactly where they were.
    #[test]
    fn test_stream_replay_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(dir.path().join("skyflow.db")).unwrap();
        let store = DocStore::new(Arc::clone(&conn));
        let ledger = InteractionLedger::new(Arc::clone(&conn));
        let mut applier =
            EntityApplier::new(DocStore::new(Arc::clone(&conn)), InteractionLedger::new(conn));

        let post_uri = "at://did:plc:alice/app.bsky.feed.post/p1";
        let events = vec![
            post_event(1, "did:plc:alice", "p1", "original"),
            like_event(2, "did:plc:bob", "l1", post_uri),
            repost_event(3, "did:plc:carol", "r1", post_uri),
            reply_event(4, "did:plc:bob", "p2", "héllo there", post_uri),
        ];

        for event in &events {
            applier.apply(&classify(event));
        }

        // Cursor checkpointed at 1; the restart replays 2..=4.
        for event in &events[1..] {
            applier.apply(&classify(event));
        }

        let post = store.get_post(post_uri).unwrap().unwrap();
        assert_eq!(post.like_count, 1);
        assert_eq!(post.repost_count, 1);
        assert_eq!(post.reply_count, 1);

        let bob = ledger
            .bucket("did:plc:bob", "did:plc:alice", &today())
            .unwrap()
            .unwrap();
        assert_eq!(bob.likes, 1);
        assert_eq!(bob.replies, 1);
        assert_eq!(bob.characters, "héllo there".chars().count() as i64);

        let carol = ledger
            .bucket("did:plc:carol", "did:plc:alice", &today())
            .unwrap()
            .unwrap();
        assert_eq!(carol.reposts, 1);
    }

    /// A like retraction undoes both the post counter and the day bucket.
    #[test]
    fn test_like_retraction_returns_counts_to_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(dir.path().join("skyflow.db")).unwrap();
        let store = DocStore::new(Arc::clone(&conn));
        let ledger = InteractionLedger::new(Arc::clone(&conn));
        let mut applier =
            EntityApplier::new(DocStore::new(Arc::clone(&conn)), InteractionLedger::new(conn));

        let post_uri = "at://did:plc:alice/app.bsky.feed.post/p1";
        applier.apply(&classify(&like_event(1, "did:plc:bob", "l1", post_uri)));

        let post = store.get_post(post_uri).unwrap().unwrap();
        assert_eq!(post.like_count, 1);

        applier.apply(&classify(&delete_event(
            2,
            "did:plc:bob",
            "app.bsky.feed.like/l1",
        )));

        let post = store.get_post(post_uri).unwrap().unwrap();
        assert_eq!(post.like_count, 0);
        let bucket = ledger
            .bucket("did:plc:bob", "did:plc:alice", &today())
            .unwrap()
            .unwrap();
        assert_eq!(bucket.likes, 0);

        // Replaying the retraction must not drive the counts negative.
        applier.apply(&classify(&delete_event(
            3,
            "did:plc:bob",
            "app.bsky.feed.like/l1",
        )));
        let post = store.get_post(post_uri).unwrap().unwrap();
        assert_eq!(post.like_count, 0);
    }

    /// Replies from one author to the same subject accumulate into a single
    /// day bucket: reply count and character volume.
    #[test]
    fn test_replies_accumulate_daily_characters() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(dir.path().join("skyflow.db")).unwrap();
        let store = DocStore::new(Arc::clone(&conn));
        let ledger = InteractionLedger::new(Arc::clone(&conn));
        let mut applier =
            EntityApplier::new(DocStore::new(Arc::clone(&conn)), InteractionLedger::new(conn));

        let post_uri = "at://did:plc:alice/app.bsky.feed.post/p1";
        applier.apply(&classify(&reply_event(
            1,
            "did:plc:bob",
            "p2",
            "héllo",
            post_uri,
        )));
        applier.apply(&classify(&reply_event(
            2,
            "did:plc:bob",
            "p3",
            "world!!",
            post_uri,
        )));

        let parent = store.get_post(post_uri).unwrap().unwrap();
        assert_eq!(parent.reply_count, 2);

        let partition = ledger.partition("did:plc:bob", "did:plc:alice").unwrap();
        assert_eq!(partition.len(), 1);
        assert_eq!(partition[0].day, today());
        assert_eq!(partition[0].replies, 2);
        assert_eq!(partition[0].characters, 5 + 7);
    }

    /// Full wiring: source to consumer to classifier to fanout to applier,
    /// sharing one SQLite file for documents, buckets and the cursor.
    #[tokio::test]
    async fn test_full_pipeline_materializes_documents() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(dir.path().join("skyflow.db")).unwrap();
        let checkpoint =
            Arc::new(SqliteCheckpointStore::with_connection(Arc::clone(&conn)).unwrap());
        let store = DocStore::new(Arc::clone(&conn));
        let ledger = InteractionLedger::new(Arc::clone(&conn));

        let applier = EntityApplier::new(
            DocStore::new(Arc::clone(&conn)),
            InteractionLedger::new(Arc::clone(&conn)),
        );
        let mut fanout = FanoutDistributor::new(64);
        fanout.spawn_consumer(applier);

        let post_uri = "at://did:plc:alice/app.bsky.feed.post/p1";
        let source = MemorySource::new(vec![
            post_event(1, "did:plc:alice", "p1", "hello stream"),
            like_event(2, "did:plc:bob", "l1", post_uri),
        ])
        .with_follow();

        let mut consumer = SubscriptionConsumer::new(
            "firehose",
            source,
            checkpoint.clone(),
            Box::new(FanoutHandler::new(fanout)),
        )
        .with_checkpoint_interval(1);
        let shutdown = consumer.shutdown_handle();

        let task = tokio::spawn(async move {
            consumer.run(Duration::from_millis(10)).await;
        });

        let mut liked = false;
        for _ in 0..200 {
            if let Some(post) = store.get_post(post_uri).unwrap() {
                if post.like_count == 1 {
                    liked = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(liked, "like never reached the document store");

        shutdown.shutdown();
        task.await.unwrap();

        let post = store.get_post(post_uri).unwrap().unwrap();
        assert_eq!(post.text.as_deref(), Some("hello stream"));
        assert_eq!(post.like_count, 1);
        assert!(!post.deleted);

        let bucket = ledger
            .bucket("did:plc:bob", "did:plc:alice", &today())
            .unwrap()
            .unwrap();
        assert_eq!(bucket.likes, 1);

        // Interval 1 checkpoints after every event.
        assert_eq!(checkpoint.get_cursor("firehose").await.unwrap(), Some(2));
    }

    /// Process events 1..=25, crash with the cursor at 20, restart. The
    /// replayed tail 21..=25 must leave the store exactly as a single pass
    /// would have.
    #[tokio::test]
    async fn test_restart_replays_checkpoint_window_without_drift() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_database(dir.path().join("skyflow.db")).unwrap();
        let checkpoint =
            Arc::new(SqliteCheckpointStore::with_connection(Arc::clone(&conn)).unwrap());
        let store = DocStore::new(Arc::clone(&conn));
        let ledger = InteractionLedger::new(Arc::clone(&conn));

        let post_uri = "at://did:plc:alice/app.bsky.feed.post/p1";
        let events: Vec<CommitEvent> = (1..=25)
            .map(|seq| like_event(seq, &format!("did:plc:u{}", seq), "l1", post_uri))
            .collect();

        let run = |source: MemorySource, interval: u64| {
            let applier = EntityApplier::new(
                DocStore::new(Arc::clone(&conn)),
                InteractionLedger::new(Arc::clone(&conn)),
            );
            let mut fanout = FanoutDistributor::new(64);
            fanout.spawn_consumer(applier);
            SubscriptionConsumer::new(
                "firehose",
                source,
                checkpoint.clone(),
                Box::new(FanoutHandler::new(fanout)),
            )
            .with_checkpoint_interval(interval)
        };

        // First run: default cadence of 20 leaves the cursor at 20 even
        // though all 25 likes were applied.
        let mut consumer = run(MemorySource::new(events.clone()).with_follow(), 20);
        let shutdown = consumer.shutdown_handle();
        let task = tokio::spawn(async move {
            consumer.run(Duration::from_millis(10)).await;
        });
        for _ in 0..300 {
            if let Some(post) = store.get_post(post_uri).unwrap() {
                if post.like_count == 25 {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.shutdown();
        task.await.unwrap();

        assert_eq!(store.get_post(post_uri).unwrap().unwrap().like_count, 25);
        assert_eq!(checkpoint.get_cursor("firehose").await.unwrap(), Some(20));

        // Restart: resumes just past 20 and replays 21..=25. The interval
        // of 5 checkpoints once the replayed tail is through.
        let mut consumer = run(MemorySource::new(events.clone()).with_follow(), 5);
        let shutdown = consumer.shutdown_handle();
        let task = tokio::spawn(async move {
            consumer.run(Duration::from_millis(10)).await;
        });
        for _ in 0..300 {
            if checkpoint.get_cursor("firehose").await.unwrap() == Some(25) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.shutdown();
        task.await.unwrap();
        // Consumer teardown closed the fanout senders; give the drain task
        // a moment to finish the queued replays.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(checkpoint.get_cursor("firehose").await.unwrap(), Some(25));

        // Replayed likes were recognized by cid and applied nowhere twice.
        let post = store.get_post(post_uri).unwrap().unwrap();
        assert_eq!(post.like_count, 25);
        let replayed = ledger.bucket("did:plc:u21", "did:plc:alice", &today()).unwrap();
        assert_eq!(replayed.unwrap().likes, 1);
    }
}
