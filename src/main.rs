use anyhow::{Context, Result};
use fraudguard_backend::config::Config;
use fraudguard_backend::model::HttpModelClient;
use fraudguard_backend::sink::DecisionStore;
use fraudguard_backend::state::RedisStateStore;
use fraudguard_backend::stream::bus::{KafkaConsumer, KafkaProducer};
use fraudguard_backend::stream::Worker;
use fraudguard_backend::telemetry;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let prometheus = telemetry::init_metrics().context("failed to install metrics recorder")?;

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    info!("fraud scoring pipeline starting");

    let state_store = Arc::new(
        RedisStateStore::connect(&config.state_store_redis_url)
            .await
            .context("failed to connect to state store")?,
    );

    let model_client = Arc::new(HttpModelClient::new(
        config.ml.endpoint.clone(),
        config.ml.timeout(),
        config.ml.enabled,
    )?);

    let decision_store = Arc::new(
        DecisionStore::open(&config.decision_store_path).context("failed to open decision store")?,
    );

    let worker_count: usize = std::env::var("STREAM_WORKER_COUNT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4);

    let mut handles = Vec::with_capacity(worker_count);
    for id in 0..worker_count {
        let source = Arc::new(KafkaConsumer::build(&config.kafka)?);
        let publisher = Arc::new(KafkaProducer::build(&config.kafka)?);
        let worker = Worker {
            config: config.clone(),
            source,
            publisher,
            state_store: state_store.clone(),
            model_client: model_client.clone(),
            decision_store: decision_store.clone(),
        };
        info!(worker_id = id, "spawning stream worker");
        handles.push(tokio::spawn(async move { worker.run().await }));
    }

    let admin = tokio::spawn({
        let bind_addr = config.admin_bind_addr.clone();
        async move { fraudguard_backend::admin::serve(&bind_addr, prometheus).await }
    });

    admin.await.context("admin server task panicked")??;
    Ok(())
}
