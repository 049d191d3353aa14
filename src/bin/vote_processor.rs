//! Vote processor: consumes the vote queue and updates the counters

use std::sync::Arc;
use tracing::Instrument;
use vote_pipeline::config::Config;
use vote_pipeline::pipeline::{AmqpTransport, RedisCounterStore, ReconnectPolicy, VoteConsumer};
use vote_pipeline::telemetry::CompositePropagator;

#[tokio::main]
async fn main() -> vote_pipeline::Result<()> {
    let config = Config::from_env()?;
    vote_pipeline::init_with(&config.logging)?;

    let service = vote_pipeline::service_span("vote-processor");
    consume(config).instrument(service).await
}

async fn consume(config: Config) -> vote_pipeline::Result<()> {
    let store = Arc::new(RedisCounterStore::connect(&config.store.redis_url).await?);
    let transport = Arc::new(AmqpTransport::connect(&config.queue).await?);

    let consumer = VoteConsumer::new(
        transport,
        store,
        config.queue.queue_spec(),
        Arc::new(CompositePropagator::default()),
        config.telemetry.sampler,
        ReconnectPolicy::from_config(&config.queue),
    );

    let (stop_tx, stop_rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("🛑 Shutdown signal received");
                let _ = stop_tx.send(()).await;
            }
            Err(e) => {
                // Keep the sender alive so the consumer is not stopped
                tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    .in_current_span());

    consumer.run(stop_rx).await?;

    let stats = consumer.stats().snapshot();
    tracing::info!(
        "📊 Processed {} votes ({} dropped, {} lost, {} reconnects)",
        stats.processed,
        stats.dropped,
        stats.lost,
        stats.reconnects
    );
    Ok(())
}
