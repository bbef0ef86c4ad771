//! Configuration for the registry service: CLI flags, each overridable by a
//! `TILEIDX_REGISTRY_*` environment variable, with `.env` consulted when
//! present (spec §6).

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tileidx-registry")]
#[command(about = "Tile registry: durable metadata and lifecycle state")]
pub struct RegistryConfig {
    /// HTTP bind port.
    #[arg(long, env = "TILEIDX_REGISTRY_PORT", default_value_t = 8081)]
    pub port: u16,

    /// Path to the sled database directory.
    #[arg(long, env = "TILEIDX_REGISTRY_DB_PATH", default_value = "./data/tile-registry")]
    pub db_path: String,
}

impl RegistryConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }
}
