use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tileidx_bus::{NatsBus, NatsBusConfig};
use tileidx_core::{RegistryClient, VectorClient};
use tileidx_scheduler::{parse_embedder_queues, Scheduler, SchedulerConfig};
use tokio::signal;

/// Resolves on SIGINT or (on unix) SIGTERM, whichever comes first — the
/// shutdown flag the tick loop observes between iterations (spec §5, §6
/// exit-code-0-on-signal).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tileidx_scheduler=info".parse()?),
        )
        .init();

    let config = SchedulerConfig::load();
    let routing = parse_embedder_queues(&config.queue_routing);

    let bus = NatsBus::connect(NatsBusConfig { url: config.nats_url.clone(), ..Default::default() }).await?;

    let scheduler = Scheduler {
        registry: RegistryClient::new(config.registry_url.clone()),
        vector: VectorClient::new(config.vector_url.clone()),
        bus: Arc::new(bus),
        routing,
        batch_size: config.batch_size,
        ttl_secs: config.ttl_secs,
        sweep_limit: config.sweep_limit,
    };

    tracing::info!(
        registry = %config.registry_url,
        vector = %config.vector_url,
        tick_secs = config.tick_secs,
        "scheduler started"
    );

    let mut tick = tokio::time::interval(Duration::from_secs(config.tick_secs));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, exiting after current tick");
                break;
            }
            _ = tick.tick() => {
                match scheduler.run_once().await {
                    Ok(n) if n > 0 => tracing::info!(published = n, "promoted ready tiles"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "tick: promotion pass failed"),
                }

                let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
                match scheduler.sweep_expired(now).await {
                    Ok(n) if n > 0 => tracing::info!(deleted = n, "swept expired tiles"),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "tick: ttl sweep failed"),
                }
            }
        }
    }

    Ok(())
}
