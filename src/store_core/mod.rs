//! Store Core - Document Store and Interaction Ledger
//!
//! This module applies classified batches to SQLite and maintains the
//! pairwise daily interaction ledger.
//!
//! # Architecture
//!
//! ```text
//! ClassifiedBatch → EntityApplier
//!     ↓                    ↓
//! DocStore (keyed upserts, ← cid version token → replay suppression)
//!     ↓                    ↓
//! post counters      InteractionLedger (atomic daily-bucket upserts)
//! ```
//!
//! Idempotency lives at this layer: the stream replays events after
//! reconnects, and every write here is keyed so a replay is a no-op.

pub mod actor_cache;
pub mod applier;
pub mod doc_store;
pub mod ledger;
pub mod schema;

pub use actor_cache::SeenActorCache;
pub use applier::EntityApplier;
pub use doc_store::{DocStore, PostCounter, StoreError};
pub use ledger::{today, DailyBucket, InteractionDelta, InteractionLedger};
pub use schema::{open_database, run_migrations};
