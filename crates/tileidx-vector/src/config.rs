use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tileidx-vector")]
#[command(about = "Vector index adapter service")]
pub struct VectorConfig {
    #[arg(long, env = "TILEIDX_VECTOR_PORT", default_value_t = 8082)]
    pub port: u16,

    /// Directory holding one sub-directory per LanceDB table.
    #[arg(long, env = "TILEIDX_VECTOR_DB_DIR", default_value = "./data/vector-tables")]
    pub db_dir: String,

    #[arg(long, env = "TILEIDX_VECTOR_COLUMN", default_value = "embedding")]
    pub vector_col: String,
}

impl VectorConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }
}
