//! HTTP surface for the retriever service (spec §4.6, §6): a single
//! `POST /search` endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tileidx_core::{embed_seed, TileidxError, VectorClient};

use crate::nms::{suppress, RankedPoint};

#[derive(Clone)]
pub struct AppState {
    pub vector: std::sync::Arc<VectorClient>,
    pub default_embedder_backend: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/search", post(search)).with_state(state)
}

struct ApiError(TileidxError);

impl From<TileidxError> for ApiError {
    fn from(e: TileidxError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TileidxError::NotFound { .. } => StatusCode::NOT_FOUND,
            TileidxError::Poison { .. } | TileidxError::DimMismatch { .. } => StatusCode::BAD_REQUEST,
            TileidxError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({"error_kind": self.0.kind(), "message": self.0.to_string()}));
        (status, body).into_response()
    }
}

#[derive(Deserialize)]
struct SearchRequest {
    query_text: String,
    table_name: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    where_: Option<String>,
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    embedder_backend: Option<String>,
    #[serde(default)]
    apply_geo_nms: bool,
    #[serde(default = "default_nms_radius")]
    geo_nms_radius_m: f64,
}

fn default_k() -> usize {
    10
}

fn default_nms_radius() -> f64 {
    50.0
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let backend = req.embedder_backend.as_deref().unwrap_or(&state.default_embedder_backend);
    let query_vector = embed_seed(&format!("{backend}:query:{}", req.query_text));

    let mut rows = state.vector.search(&req.table_name, query_vector, req.k, req.where_.as_deref(), req.columns).await?;

    if req.apply_geo_nms && !rows.is_empty() {
        let ranked: Vec<RankedPoint> = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let lat = row.get("lat")?.as_f64()?;
                let lon = row.get("lon")?.as_f64()?;
                Some(RankedPoint { index: i, lat, lon })
            })
            .collect();

        if ranked.len() == rows.len() {
            let keep = suppress(&ranked, req.geo_nms_radius_m);
            let keep_set: std::collections::HashSet<usize> = keep.into_iter().collect();
            rows = rows.into_iter().enumerate().filter(|(i, _)| keep_set.contains(i)).map(|(_, r)| r).collect();
        }
    }

    Ok(Json(serde_json::json!({"results": rows})))
}
