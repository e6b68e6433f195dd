//! Batch fanout: one publisher, N consumers over bounded channels.
//!
//! The ingestion loop publishes each classified batch to every registered
//! consumer. Channels are bounded and delivery uses `try_send`: a consumer
//! that cannot keep up loses batches (warn log + drop counter) rather than
//! stalling the stream. Consumers run in their own drain tasks and own
//! their error handling; a failing consumer never propagates upstream.

use crate::firehose_core::consumer::CommitHandler;
use crate::firehose_core::types::CommitEvent;
use crate::pipeline::batch::ClassifiedBatch;
use crate::pipeline::classifier::classify;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_CHANNEL_BUFFER: usize = 1024;

/// A fanout sink. Implementations own their storage and locking.
#[async_trait]
pub trait BatchConsumer: Send {
    /// Stable name used in logs and drop counters.
    fn name(&self) -> &str;

    async fn on_batch(
        &mut self,
        batch: Arc<ClassifiedBatch>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

struct ConsumerChannel {
    name: String,
    tx: mpsc::Sender<Arc<ClassifiedBatch>>,
    dropped: Arc<AtomicU64>,
}

/// Registry of consumer channels plus the non-blocking publish policy.
pub struct FanoutDistributor {
    buffer: usize,
    channels: Vec<ConsumerChannel>,
}

impl FanoutDistributor {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            channels: Vec::new(),
        }
    }

    /// Spawn a drain task for `consumer` and register its channel.
    ///
    /// The task runs until the channel closes (all senders dropped).
    /// Consumer errors are logged per batch and do not stop the drain.
    pub fn spawn_consumer<C: BatchConsumer + 'static>(&mut self, mut consumer: C) -> JoinHandle<()> {
        let (tx, mut rx) = mpsc::channel::<Arc<ClassifiedBatch>>(self.buffer);
        let name = consumer.name().to_string();
        let dropped = Arc::new(AtomicU64::new(0));
        self.channels.push(ConsumerChannel {
            name: name.clone(),
            tx,
            dropped,
        });

        tokio::spawn(async move {
            log::info!("📥 Consumer '{}' started", name);
            while let Some(batch) = rx.recv().await {
                if let Err(e) = consumer.on_batch(batch).await {
                    log::error!("Consumer '{}' failed on batch: {}", name, e);
                }
            }
            log::info!("Consumer '{}' channel closed, stopping", name);
        })
    }

    /// Deliver one batch to every consumer without blocking.
    ///
    /// A full or closed channel drops the batch for that consumer only;
    /// the others still receive it.
    pub fn publish(&self, batch: ClassifiedBatch) {
        let batch = Arc::new(batch);
        for channel in &self.channels {
            match channel.tx.try_send(Arc::clone(&batch)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    let total = channel.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    log::warn!(
                        "⚠️ Consumer '{}' channel full, dropping batch seq {} ({} dropped so far)",
                        channel.name,
                        batch.sequence,
                        total
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    let total = channel.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    log::warn!(
                        "⚠️ Consumer '{}' channel closed, dropping batch seq {} ({} dropped so far)",
                        channel.name,
                        batch.sequence,
                        total
                    );
                }
            }
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.channels.len()
    }

    pub fn dropped_for(&self, name: &str) -> u64 {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn dropped_total(&self) -> u64 {
        self.channels
            .iter()
            .map(|c| c.dropped.load(Ordering::Relaxed))
            .sum()
    }

    /// Drop all sender handles so drain tasks finish once their queues empty.
    pub fn close(&mut self) {
        self.channels.clear();
    }
}

/// The production commit handler: classify, then publish.
///
/// Empty batches (every operation skipped or the commit touched nothing we
/// track) are not published.
pub struct FanoutHandler {
    fanout: FanoutDistributor,
}

impl FanoutHandler {
    pub fn new(fanout: FanoutDistributor) -> Self {
        Self { fanout }
    }

    pub fn fanout(&self) -> &FanoutDistributor {
        &self.fanout
    }
}

#[async_trait]
impl CommitHandler for FanoutHandler {
    async fn handle(
        &mut self,
        event: &CommitEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let batch = classify(event);
        if batch.skipped > 0 {
            log::debug!(
                "Commit seq {} from {}: {} op(s) skipped",
                batch.sequence,
                batch.repo,
                batch.skipped
            );
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.fanout.publish(batch);
        Ok(())
    }
}
