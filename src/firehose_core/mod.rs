pub mod checkpoint;
pub mod consumer;
pub mod source;
pub mod types;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use consumer::{CommitHandler, ShutdownHandle, SubscriptionConsumer};
pub use source::{ChannelSource, CommitSource, JsonlReplaySource, MemorySource, SourceError};
pub use types::{Collection, CommitEvent, OpAction, RepoOp};
