use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tileidx-worker")]
#[command(about = "Consumes IndexRequest messages and upserts embeddings into the vector index")]
pub struct WorkerConfig {
    #[arg(long, env = "TILEIDX_WORKER_REGISTRY_URL", default_value = "http://127.0.0.1:8081")]
    pub registry_url: String,

    #[arg(long, env = "TILEIDX_WORKER_VECTOR_URL", default_value = "http://127.0.0.1:8082")]
    pub vector_url: String,

    #[arg(long, env = "TILEIDX_WORKER_NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// Comma-separated queue name(s) to consume from.
    #[arg(long, env = "TILEIDX_WORKER_QUEUE", default_value = "embed.default")]
    pub queue: String,

    #[arg(long, env = "TILEIDX_WORKER_EMBEDDER_BACKEND", default_value = "fake")]
    pub embedder_backend: String,

    #[arg(long, env = "TILEIDX_WORKER_EMBEDDER_MODEL", default_value = "unit-vector-v1")]
    pub embedder_model: String,

    /// Fixed output table name; empty means derive one per embedder model.
    #[arg(long, env = "TILEIDX_WORKER_TABLE_NAME", default_value = "")]
    pub table_name: String,

    #[arg(long, env = "TILEIDX_WORKER_BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, env = "TILEIDX_WORKER_FLUSH_INTERVAL_SECS", default_value_t = 2)]
    pub flush_interval_secs: u64,

    #[arg(long, env = "TILEIDX_WORKER_DECODE_WORKERS", default_value_t = 4)]
    pub decode_workers: usize,

    #[arg(long, env = "TILEIDX_WORKER_JOB_TIMEOUT_SECS", default_value_t = 30)]
    pub job_timeout_secs: u64,

    #[arg(long, env = "TILEIDX_WORKER_PREFETCH", default_value_t = 64)]
    pub prefetch: u32,
}

impl WorkerConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }
}
