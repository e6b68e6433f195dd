//! Classification and fanout: turns ordered commit events into typed
//! entity batches and distributes them to storage consumers.
//!
//! ## Module Organization
//!
//! - `batch` - Typed entity batches (`ClassifiedBatch`, `RecordBatch`)
//! - `classifier` - Pure commit-event classification
//! - `fanout` - Bounded-channel distribution to `BatchConsumer`s
//! - `jsonl_sink` - Optional JSONL archive consumer with rotation

pub mod batch;
pub mod classifier;
pub mod fanout;
pub mod jsonl_sink;

pub use batch::{ClassifiedBatch, RecordBatch};
pub use classifier::classify;
pub use fanout::{BatchConsumer, FanoutDistributor, FanoutHandler, DEFAULT_CHANNEL_BUFFER};
pub use jsonl_sink::JsonlSink;
