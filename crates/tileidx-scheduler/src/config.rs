use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tileidx-scheduler")]
#[command(about = "Promotes READY_FOR_INDEXING tiles onto embedder queues and sweeps expired rows")]
pub struct SchedulerConfig {
    #[arg(long, env = "TILEIDX_SCHEDULER_REGISTRY_URL", default_value = "http://127.0.0.1:8081")]
    pub registry_url: String,

    #[arg(long, env = "TILEIDX_SCHEDULER_VECTOR_URL", default_value = "http://127.0.0.1:8082")]
    pub vector_url: String,

    #[arg(long, env = "TILEIDX_SCHEDULER_NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// `backend=queue,backend:model=queue,...` routing table (spec §4.4).
    #[arg(long, env = "TILEIDX_SCHEDULER_QUEUE_ROUTING", default_value = "")]
    pub queue_routing: String,

    #[arg(long, env = "TILEIDX_SCHEDULER_BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    #[arg(long, env = "TILEIDX_SCHEDULER_TICK_SECS", default_value_t = 5)]
    pub tick_secs: u64,

    /// Indexed rows older than this many seconds are swept on each tick.
    #[arg(long, env = "TILEIDX_SCHEDULER_TTL_SECS", default_value_t = 30 * 24 * 3600)]
    pub ttl_secs: i64,

    #[arg(long, env = "TILEIDX_SCHEDULER_SWEEP_LIMIT", default_value_t = 500)]
    pub sweep_limit: usize,
}

impl SchedulerConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }
}
