//! Ingest Runtime - Standalone Firehose Ingestion Service
//!
//! Wires the full pipeline end to end: a commit source feeds the
//! subscription consumer, the fanout handler classifies each event and
//! distributes batches to the entity applier (and optionally a JSONL
//! archive sink), and the applier materializes documents and interaction
//! buckets in SQLite.
//!
//! The standalone binary reads decoded commit events from a JSONL capture
//! file (SKYFLOW_REPLAY_PATH), tailing it as it grows. A live wire intake
//! embeds the library directly and feeds a `ChannelSource` instead.
//!
//! Usage: cargo run --bin ingest_runtime

use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;

use skyflow::config::IngestConfig;
use skyflow::firehose_core::{JsonlReplaySource, SqliteCheckpointStore, SubscriptionConsumer};
use skyflow::pipeline::{FanoutDistributor, FanoutHandler, JsonlSink};
use skyflow::store_core::{
    open_database, DocStore, EntityApplier, InteractionLedger, SeenActorCache,
};
use skyflow::store_core::actor_cache::DEFAULT_MAX_ENTRIES;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Skyflow Ingest Runtime");

    let config = IngestConfig::from_env();

    info!("📄 Configuration:");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Stream: {}", config.stream_name);
    info!("   ├─ Reconnect delay: {}s", config.reconnect_delay_secs);
    info!("   ├─ Channel buffer: {}", config.channel_buffer);
    if config.enable_archive {
        info!("   ├─ Archive: {} (max {}MB, {} rotations)",
            config.archive_path, config.archive_max_size_mb, config.archive_max_rotations);
    } else {
        info!("   ├─ Archive: disabled");
    }
    match &config.replay_path {
        Some(path) => info!("   └─ Source: JSONL capture at {}", path),
        None => info!("   └─ Source: none configured"),
    }

    let replay_path = match config.replay_path.clone() {
        Some(path) => path,
        None => {
            warn!("⚠️ SKYFLOW_REPLAY_PATH is not set");
            info!("   The standalone runtime tails a JSONL commit capture.");
            info!("   Live wire intake embeds the library and feeds a ChannelSource.");
            return Ok(());
        }
    };

    // Shared connection: documents, interaction buckets and the stream
    // cursor commit through the same handle.
    let conn = open_database(&config.db_path)?;
    let checkpoint = Arc::new(SqliteCheckpointStore::with_connection(Arc::clone(&conn))?);

    let store = DocStore::new(Arc::clone(&conn));
    let ledger = InteractionLedger::new(Arc::clone(&conn));
    let cache = SeenActorCache::new(config.actor_cache_ttl(), DEFAULT_MAX_ENTRIES);
    let applier = EntityApplier::new(store, ledger).with_actor_cache(cache);

    let mut fanout = FanoutDistributor::new(config.channel_buffer);
    fanout.spawn_consumer(applier);
    if config.enable_archive {
        let sink = JsonlSink::new(
            &config.archive_path,
            config.archive_max_size_mb,
            config.archive_max_rotations,
        )?;
        fanout.spawn_consumer(sink);
    }
    info!("✅ Fanout ready with {} consumer(s)", fanout.consumer_count());

    let source = JsonlReplaySource::new(&replay_path);
    let mut consumer = SubscriptionConsumer::new(
        &config.stream_name,
        source,
        checkpoint,
        Box::new(FanoutHandler::new(fanout)),
    );
    let shutdown = consumer.shutdown_handle();

    let reconnect_delay = config.reconnect_delay();
    let consumer_task = tokio::spawn(async move {
        consumer.run(reconnect_delay).await;
    });

    info!("✅ Ingest runtime started, press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("📥 Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    shutdown.shutdown();
    if let Err(e) = consumer_task.await {
        error!("Consumer task panicked: {}", e);
    }

    // Give fanout consumers a moment to drain in-flight batches.
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("✅ Ingest runtime stopped");
    Ok(())
}
