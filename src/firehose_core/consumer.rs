//! Subscription consumer: the ordered ingestion loop.
//!
//! One consumer owns one stream name. Events are handled strictly in
//! sequence order: the handler is awaited per event before the next
//! receive, which is the pipeline's only ordering guarantee. Handler
//! errors are non-fatal (logged, loop continues); transport failures tear
//! the subscription down and reconnect after a fixed delay from the last
//! persisted cursor, replaying up to `checkpoint_interval - 1` events.
//! Downstream appliers are idempotent against that replay.
//!
//! Run exactly one consumer loop per stream name; two loops sharing a
//! cursor would fight over it.

use crate::firehose_core::checkpoint::CheckpointStore;
use crate::firehose_core::source::CommitSource;
use crate::firehose_core::types::CommitEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

/// Cursor persistence cadence: every N handled events, counted since
/// process start (not per connection, not wall clock).
pub const DEFAULT_CHECKPOINT_INTERVAL: u64 = 20;

/// Per-event callback invoked by the consumer, strictly sequentially.
#[async_trait]
pub trait CommitHandler: Send {
    async fn handle(
        &mut self,
        event: &CommitEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Requests a cooperative stop of the consumer loop.
///
/// The flag is observed between events; an in-flight handler always runs
/// to completion first.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

pub struct SubscriptionConsumer<S: CommitSource> {
    stream_name: String,
    source: S,
    checkpoint: Arc<dyn CheckpointStore>,
    handler: Box<dyn CommitHandler>,
    checkpoint_interval: u64,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    /// Events handled since process start; drives the checkpoint cadence.
    events_handled: u64,
    window_count: u64,
    window_start: Instant,
}

impl<S: CommitSource> SubscriptionConsumer<S> {
    pub fn new(
        stream_name: impl Into<String>,
        source: S,
        checkpoint: Arc<dyn CheckpointStore>,
        handler: Box<dyn CommitHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            stream_name: stream_name.into(),
            source,
            checkpoint,
            handler,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_handled: 0,
            window_count: 0,
            window_start: Instant::now(),
        }
    }

    /// Override the checkpoint cadence (tests shrink it).
    pub fn with_checkpoint_interval(mut self, events: u64) -> Self {
        self.checkpoint_interval = events.max(1);
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run the consumption loop. Under normal operation this never
    /// returns; it comes back only after a `ShutdownHandle` request.
    ///
    /// Any transport failure (failed subscribe, stream channel closing)
    /// abandons the connection and retries after `reconnect_delay`,
    /// resuming just past the last persisted cursor.
    pub async fn run(&mut self, reconnect_delay: Duration) {
        let mut shutdown = self.shutdown_rx.clone();

        loop {
            if *shutdown.borrow() {
                log::info!("[{}] Consumer shut down", self.stream_name);
                return;
            }

            let cursor = match self.checkpoint.get_cursor(&self.stream_name).await {
                Ok(cursor) => cursor,
                Err(e) => {
                    log::error!("[{}] Failed to read cursor: {}", self.stream_name, e);
                    sleep(reconnect_delay).await;
                    continue;
                }
            };

            match self.source.subscribe(cursor).await {
                Ok(mut rx) => {
                    match cursor {
                        Some(seq) => log::info!(
                            "[{}] Subscribed, resuming after sequence {}",
                            self.stream_name,
                            seq
                        ),
                        None => {
                            log::info!("[{}] Subscribed at live tail", self.stream_name)
                        }
                    }

                    loop {
                        tokio::select! {
                            maybe_event = rx.recv() => match maybe_event {
                                Some(event) => self.process_event(event).await,
                                None => {
                                    log::warn!(
                                        "[{}] Stream closed by transport",
                                        self.stream_name
                                    );
                                    break;
                                }
                            },
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    log::info!("[{}] Consumer shut down", self.stream_name);
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("[{}] Subscribe failed: {}", self.stream_name, e);
                }
            }

            if *shutdown.borrow() {
                log::info!("[{}] Consumer shut down", self.stream_name);
                return;
            }

            log::info!(
                "[{}] Reconnecting in {}s",
                self.stream_name,
                reconnect_delay.as_secs_f64()
            );
            sleep(reconnect_delay).await;
        }
    }

    /// Handle one event and advance the checkpoint cadence.
    ///
    /// A handler error is logged and dropped: one bad event must not halt
    /// the stream. The cursor is persisted only after the handler has
    /// completed, so a checkpoint never covers unhandled events.
    async fn process_event(&mut self, event: CommitEvent) {
        let sequence = event.sequence;

        if let Err(e) = self.handler.handle(&event).await {
            log::error!(
                "[{}] Handler failed for sequence {}: {}",
                self.stream_name,
                sequence,
                e
            );
        }

        self.events_handled += 1;
        if self.events_handled % self.checkpoint_interval == 0 {
            match self.checkpoint.set_cursor(&self.stream_name, sequence).await {
                Ok(()) => log::debug!(
                    "[{}] Checkpoint at sequence {}",
                    self.stream_name,
                    sequence
                ),
                Err(e) => log::warn!(
                    "[{}] Failed to persist cursor at {}: {}",
                    self.stream_name,
                    sequence,
                    e
                ),
            }
        }

        // Throughput log every 10 seconds
        self.window_count += 1;
        if self.window_start.elapsed().as_secs() >= 10 {
            let rate = self.window_count as f64 / self.window_start.elapsed().as_secs_f64();
            log::info!(
                "[{}] Ingestion rate: {:.1} events/sec (total: {})",
                self.stream_name,
                rate,
                self.events_handled
            );
            self.window_count = 0;
            self.window_start = Instant::now();
        }
    }
}
