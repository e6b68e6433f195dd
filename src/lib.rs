//! skyflow - ordered firehose ingestion for a federated social network.
//!
//! The pipeline consumes a strictly ordered stream of repository commit
//! events, classifies each commit's operations into typed entity batches,
//! and fans batches out to storage consumers. The stock consumer applies
//! entities to a SQLite document store idempotently and maintains a
//! pairwise daily interaction ledger.
//!
//! ```text
//! CommitSource → SubscriptionConsumer → classify → FanoutDistributor
//!                      ↕                                ↓         ↓
//!               CheckpointStore                  EntityApplier  JsonlSink
//!                                                   ↓      ↓
//!                                              DocStore  InteractionLedger
//! ```
//!
//! Delivery is at-least-once: the cursor is checkpointed every N events,
//! so a reconnect replays a bounded tail. Storage writes are keyed by
//! record URI with the cid as version token, which makes that replay
//! invisible downstream.

#[cfg(test)]
mod tests;

pub mod config;
pub mod firehose_core;
pub mod pipeline;
pub mod store_core;

pub use config::IngestConfig;
