use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tileidx-retriever")]
#[command(about = "Text-query retrieval service: encode, ANN search, optional geo NMS")]
pub struct RetrieverConfig {
    #[arg(long, env = "TILEIDX_RETRIEVER_PORT", default_value_t = 8083)]
    pub port: u16,

    #[arg(long, env = "TILEIDX_RETRIEVER_VECTOR_URL", default_value = "http://127.0.0.1:8082")]
    pub vector_url: String,

    #[arg(long, env = "TILEIDX_RETRIEVER_EMBEDDER_BACKEND", default_value = "fake")]
    pub default_embedder_backend: String,
}

impl RetrieverConfig {
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }
}
