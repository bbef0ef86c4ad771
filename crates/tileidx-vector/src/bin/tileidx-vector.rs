use std::net::SocketAddr;
use std::sync::Arc;

use tileidx_vector::{router, AppState, VectorConfig, VectorIndexAdapter};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("tileidx_vector=info".parse()?),
        )
        .init();

    let config = VectorConfig::load();
    let adapter = Arc::new(VectorIndexAdapter::connect(&config.db_dir).await?);
    let state = AppState { adapter, vector_col: config.vector_col.clone() };

    let app = router(state).layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "vector index service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
