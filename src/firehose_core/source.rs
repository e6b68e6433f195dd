//! Commit event sources.
//!
//! The protocol client that speaks the wire format lives outside this
//! crate; a `CommitSource` is the seam it plugs into. Implementations here:
//! `ChannelSource` (an external client pushes decoded events through a
//! sender handle), `JsonlReplaySource` (tail a JSONL capture file) and
//! `MemorySource` (scripted in-memory delivery with optional fault
//! injection, used by the reconnect tests).

use crate::firehose_core::types::CommitEvent;
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::sleep;

#[derive(Debug)]
pub enum SourceError {
    Connect(String),
    Io(std::io::Error),
    /// The source cannot produce another subscription (e.g. a one-shot
    /// channel source whose feed has ended).
    Exhausted,
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err)
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Connect(msg) => write!(f, "Connection error: {}", msg),
            SourceError::Io(e) => write!(f, "IO error: {}", e),
            SourceError::Exhausted => write!(f, "Source exhausted"),
        }
    }
}

impl std::error::Error for SourceError {}

/// A subscribable, ordered stream of commit events.
///
/// `subscribe(cursor)` requests the stream starting just after `cursor`
/// (`None` = the endpoint's default, i.e. live tail). Delivery is a bounded
/// channel; the sender side dropping models a transport failure and the
/// consumer reacts by reconnecting from its last persisted cursor.
#[async_trait]
pub trait CommitSource: Send + Sync {
    async fn subscribe(
        &self,
        cursor: Option<i64>,
    ) -> Result<mpsc::Receiver<CommitEvent>, SourceError>;
}

/// Buffer size for subscription channels.
const SOURCE_CHANNEL_BUFFER: usize = 1024;

// ---------------------------------------------------------------------------
// ChannelSource
// ---------------------------------------------------------------------------

/// Source fed by an external client through an `mpsc::Sender` handle.
///
/// Each pushed event is delivered at most once; the cursor filter is
/// applied defensively on the consuming side. The feeding client owns its
/// own reconnect behavior and should keep the sender alive for the life of
/// the process.
pub struct ChannelSource {
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<CommitEvent>>>,
}

/// Create a channel-backed source plus the sender the external client
/// pushes decoded events into.
pub fn channel_source(capacity: usize) -> (mpsc::Sender<CommitEvent>, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        tx,
        ChannelSource {
            rx: tokio::sync::Mutex::new(Some(rx)),
        },
    )
}

#[async_trait]
impl CommitSource for ChannelSource {
    async fn subscribe(
        &self,
        cursor: Option<i64>,
    ) -> Result<mpsc::Receiver<CommitEvent>, SourceError> {
        let mut upstream = self
            .rx
            .lock()
            .await
            .take()
            .ok_or(SourceError::Exhausted)?;

        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_BUFFER);
        tokio::spawn(async move {
            while let Some(event) = upstream.recv().await {
                if let Some(cur) = cursor {
                    if event.sequence <= cur {
                        continue;
                    }
                }
                if tx.send(event).await.is_err() {
                    // Subscriber went away; stop forwarding
                    break;
                }
            }
        });

        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// JsonlReplaySource
// ---------------------------------------------------------------------------

/// Source replaying a JSONL capture file (one `CommitEvent` per line).
///
/// In follow mode the reader keeps polling for appended lines like a
/// `tail -f`, which makes a capture file behave like a live endpoint. With
/// follow disabled the subscription ends at EOF (one-shot backfill).
/// Malformed lines are logged and skipped, never fatal.
pub struct JsonlReplaySource {
    path: PathBuf,
    follow: bool,
    poll_interval: Duration,
}

impl JsonlReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            follow: true,
            poll_interval: Duration::from_millis(100),
        }
    }

    /// Disable tail-follow: the subscription channel closes at EOF.
    pub fn one_shot(mut self) -> Self {
        self.follow = false;
        self
    }
}

#[async_trait]
impl CommitSource for JsonlReplaySource {
    async fn subscribe(
        &self,
        cursor: Option<i64>,
    ) -> Result<mpsc::Receiver<CommitEvent>, SourceError> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(0)).await?;

        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_BUFFER);
        let path = self.path.clone();
        let follow = self.follow;
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        if !follow {
                            break; // EOF, one-shot replay done
                        }
                        sleep(poll_interval).await;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<CommitEvent>(trimmed) {
                            Ok(event) => {
                                if let Some(cur) = cursor {
                                    if event.sequence <= cur {
                                        continue;
                                    }
                                }
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                log::warn!(
                                    "Skipping malformed replay line in {}: {}",
                                    path.display(),
                                    e
                                );
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("Replay read failed for {}: {}", path.display(), e);
                        break; // Sender drops, consumer reconnects
                    }
                }
            }
        });

        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// Scripted in-memory source.
///
/// Delivers the configured events with `sequence > cursor` in order. An
/// optional fault budget drops the connection after N deliveries per
/// subscription, which is how the reconnect/resume tests simulate a
/// transport failure mid-stream.
pub struct MemorySource {
    events: Vec<CommitEvent>,
    fault_after: Option<usize>,
    follow: bool,
}

impl MemorySource {
    pub fn new(events: Vec<CommitEvent>) -> Self {
        Self {
            events,
            fault_after: None,
            follow: false,
        }
    }

    /// Inject a transport fault after `n` deliveries on each subscription.
    pub fn with_fault_after(mut self, n: usize) -> Self {
        self.fault_after = Some(n);
        self
    }

    /// Keep the subscription open after the scripted events are exhausted
    /// (the consumer then idles like on a quiet live tail).
    pub fn with_follow(mut self) -> Self {
        self.follow = true;
        self
    }
}

#[async_trait]
impl CommitSource for MemorySource {
    async fn subscribe(
        &self,
        cursor: Option<i64>,
    ) -> Result<mpsc::Receiver<CommitEvent>, SourceError> {
        let pending: Vec<CommitEvent> = self
            .events
            .iter()
            .filter(|e| cursor.map_or(true, |cur| e.sequence > cur))
            .cloned()
            .collect();
        let fault_after = self.fault_after;
        let follow = self.follow;

        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_BUFFER);
        tokio::spawn(async move {
            let mut delivered = 0usize;
            for event in pending {
                if let Some(limit) = fault_after {
                    if delivered >= limit {
                        return; // Simulated transport drop
                    }
                }
                if tx.send(event).await.is_err() {
                    return;
                }
                delivered += 1;
            }
            if follow {
                // Hold the sender open so the stream looks idle, not dead
                std::future::pending::<()>().await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firehose_core::types::OpAction;
    use crate::firehose_core::types::RepoOp;
    use tokio::io::AsyncWriteExt;

    fn make_event(sequence: i64) -> CommitEvent {
        CommitEvent {
            sequence,
            repo: "did:plc:alice".to_string(),
            operations: vec![RepoOp {
                action: OpAction::Create,
                path: format!("app.bsky.feed.post/{}", sequence),
                record: Some(serde_json::json!({ "text": "hi" })),
                cid: Some(format!("bafy{}", sequence)),
            }],
        }
    }

    #[tokio::test]
    async fn test_memory_source_resumes_after_cursor() {
        let source = MemorySource::new((1..=5).map(make_event).collect());

        let mut rx = source.subscribe(Some(3)).await.unwrap();
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.sequence);
        }
        assert_eq!(seen, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_memory_source_fault_injection_drops_stream() {
        let source = MemorySource::new((1..=5).map(make_event).collect()).with_fault_after(2);

        let mut rx = source.subscribe(None).await.unwrap();
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.sequence);
        }
        // Channel closed after 2 deliveries = transport failure
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_channel_source_filters_by_cursor() {
        let (tx, source) = channel_source(16);

        for seq in 1..=4 {
            tx.send(make_event(seq)).await.unwrap();
        }
        drop(tx);

        let mut rx = source.subscribe(Some(2)).await.unwrap();
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.sequence);
        }
        assert_eq!(seen, vec![3, 4]);

        // A second subscribe has nothing to hand out
        assert!(matches!(
            source.subscribe(None).await,
            Err(SourceError::Exhausted)
        ));
    }

    #[tokio::test]
    async fn test_jsonl_replay_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut file = tokio::fs::File::create(&path).await.unwrap();
        for seq in 1..=3 {
            let json = serde_json::to_string(&make_event(seq)).unwrap();
            file.write_all(json.as_bytes()).await.unwrap();
            file.write_all(b"\n").await.unwrap();
        }
        file.write_all(b"{not json}\n").await.unwrap();
        let json = serde_json::to_string(&make_event(4)).unwrap();
        file.write_all(json.as_bytes()).await.unwrap();
        file.write_all(b"\n").await.unwrap();
        file.flush().await.unwrap();
        drop(file);

        let source = JsonlReplaySource::new(&path).one_shot();
        let mut rx = source.subscribe(Some(1)).await.unwrap();
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event.sequence);
        }
        assert_eq!(seen, vec![2, 3, 4]);
    }
}
