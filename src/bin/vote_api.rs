//! Vote API server: casts votes onto the queue and serves the tally

use std::sync::Arc;
use tracing::Instrument;
use vote_pipeline::api::{AppState, create_router};
use vote_pipeline::config::Config;
use vote_pipeline::pipeline::{AmqpTransport, RedisCounterStore, TallyReader, VotePublisher};
use vote_pipeline::telemetry::{CompositePropagator, TextMapPropagator, VoteMetrics};

#[tokio::main]
async fn main() -> vote_pipeline::Result<()> {
    let config = Config::from_env()?;
    vote_pipeline::init_with(&config.logging)?;

    let service = vote_pipeline::service_span("vote-api");
    serve(config, service.clone()).instrument(service).await
}

async fn serve(config: Config, service: tracing::Span) -> vote_pipeline::Result<()> {
    let store = Arc::new(RedisCounterStore::connect(&config.store.redis_url).await?);
    let transport = Arc::new(AmqpTransport::connect(&config.queue).await?);
    let propagator: Arc<dyn TextMapPropagator> = Arc::new(CompositePropagator::default());

    let state = Arc::new(AppState {
        publisher: VotePublisher::new(
            transport,
            config.queue.queue_spec(),
            propagator.clone(),
            config.telemetry.sampler,
            Arc::new(VoteMetrics::new()),
        ),
        tally: TallyReader::new(store, config.votes.clone(), config.telemetry.sampler),
        propagator,
        service,
    });

    let listener = tokio::net::TcpListener::bind(&config.http.bind)
        .await
        .map_err(|e| {
            vote_pipeline::Error::configuration(format!("Cannot bind {}: {}", config.http.bind, e))
        })?;

    tracing::info!("🌐 Vote API listening on {}", config.http.bind);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| vote_pipeline::Error::internal(format!("Server error: {e}")))?;

    tracing::info!("✅ Vote API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("🛑 Shutdown signal received");
}
