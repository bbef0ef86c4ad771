use std::net::SocketAddr;
use std::sync::Arc;

use tileidx_core::VectorClient;
use tileidx_retriever::{router, AppState, RetrieverConfig};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tileidx_retriever=info".parse()?),
        )
        .init();

    let config = RetrieverConfig::load();
    let state = AppState {
        vector: Arc::new(VectorClient::new(config.vector_url.clone())),
        default_embedder_backend: config.default_embedder_backend.clone(),
    };

    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "retriever service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
