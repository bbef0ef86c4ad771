//! HTTP surface for the tile registry service (spec §6).

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tileidx_core::{Tile, TileStatus, TileidxError};

use crate::store::TileRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TileRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tiles", get(list_by_status).post(upsert_tile))
        .route("/tiles/batch", post(upsert_batch))
        .route("/tiles/batch/status", post(update_status_batch))
        .route("/tiles/status/counts", get(status_counts))
        .route("/tiles/:id", get(get_tile).delete(delete_tile))
        .route("/tiles/:id/status", post(update_status_one))
        .with_state(state)
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
            TileidxError::InvalidState { .. } | TileidxError::Poison { .. } => StatusCode::BAD_REQUEST,
            TileidxError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error_kind": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Deserialize)]
struct ListQuery {
    status: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    100
}

async fn list_by_status(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Tile>>, ApiError> {
    let status = TileStatus::parse(&q.status)
        .ok_or_else(|| TileidxError::poison(format!("unknown status '{}'", q.status)))?;
    let rows = state.registry.list_by_status(status, q.limit, q.offset)?;
    Ok(Json(rows))
}

async fn upsert_tile(State(state): State<AppState>, Json(tile): Json<Tile>) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.upsert_tiles(vec![tile])?;
    Ok(Json(serde_json::json!({"upserted": 1})))
}

#[derive(Deserialize)]
struct BatchUpsertRequest {
    tiles: Vec<Tile>,
}

async fn upsert_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchUpsertRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state.registry.upsert_tiles(req.tiles)?;
    Ok(Json(serde_json::json!({"upserted": count})))
}

async fn get_tile(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Tile>, ApiError> {
    let tile = state.registry.get(&id)?.ok_or_else(|| TileidxError::NotFound { what: format!("tile '{id}'") })?;
    Ok(Json(tile))
}

async fn delete_tile(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state.registry.delete(&[id])?;
    Ok(Json(serde_json::json!({"deleted": deleted})))
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: String,
}

async fn update_status_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StatusUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = TileStatus::parse(&req.status)
        .ok_or_else(|| TileidxError::poison(format!("unknown status '{}'", req.status)))?;
    let changed = state.registry.update_status(&[id], status)?;
    Ok(Json(serde_json::json!({"changed": changed})))
}

#[derive(Deserialize)]
struct BatchStatusUpdate {
    ids: Vec<String>,
    status: String,
}

async fn update_status_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchStatusUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = TileStatus::parse(&req.status)
        .ok_or_else(|| TileidxError::poison(format!("unknown status '{}'", req.status)))?;
    let changed = state.registry.update_status(&req.ids, status)?;
    Ok(Json(serde_json::json!({"changed": changed})))
}

async fn status_counts(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let counts = state.registry.status_counts()?;
    Ok(Json(serde_json::json!(counts)))
}
