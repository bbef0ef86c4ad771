use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tileidx_bus::{ConsumeStyle, MessageBus, NatsBus, NatsBusConfig};
use tileidx_core::{RegistryClient, VectorClient};
use tileidx_worker::{Worker, WorkerConfig};
use tokio::sync::Semaphore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("tileidx_worker=info".parse()?))
        .init();

    let config = WorkerConfig::load();
    let bus = NatsBus::connect(NatsBusConfig { url: config.nats_url.clone(), ..Default::default() }).await?;
    let consumer = bus.consumer(&config.queue, config.prefetch, ConsumeStyle::Callback).await?;

    let worker = Worker {
        registry: RegistryClient::new(config.registry_url.clone()),
        vector: VectorClient::new(config.vector_url.clone()),
        decode_permits: Arc::new(Semaphore::new(config.decode_workers.max(1))),
        seen_image_ids: Mutex::new(HashSet::new()),
        config,
    };

    tracing::info!(queue = %worker.config.queue, "embedder worker started");
    worker.run(consumer).await;
    Ok(())
}
