//! HTTP surface for the vector index service (spec §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tileidx_core::TileidxError;

use crate::adapter::VectorIndexAdapter;
use crate::rows::Row;
use crate::schema::VectorDType;

#[derive(Clone)]
pub struct AppState {
    pub adapter: Arc<VectorIndexAdapter>,
    pub vector_col: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tables", get(list_tables))
        .route("/tables/:name/info", get(table_info))
        .route("/tables/:name/search", post(search))
        .route("/tables/:name/rows", post(sample_rows))
        .route("/tables/:name/upsert", post(upsert))
        .route("/tables/:name/delete", post(delete_rows))
        .route("/tables/:name/export", post(export))
        .route("/tables/:name/optimize", post(optimize))
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
            TileidxError::Poison { .. } | TileidxError::DimMismatch { .. } => StatusCode::BAD_REQUEST,
            TileidxError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TileidxError::SchemaConflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({"error_kind": self.0.kind(), "message": self.0.to_string()}));
        (status, body).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn list_tables(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.adapter.list_tables().await?))
}

async fn table_info(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let info = state.adapter.table_info(&name, &state.vector_col).await?;
    Ok(Json(serde_json::json!({
        "db_dir": state.adapter.db_dir().to_string_lossy(),
        "table_name": info.table_name,
        "vector_col": info.vector_col,
        "vector_dim": info.vector_dim,
        "row_count": info.row_count,
        "columns": info.columns,
    })))
}

#[derive(Deserialize)]
struct SearchRequest {
    query_vector: Vec<f32>,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default)]
    where_: Option<String>,
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default)]
    nprobes: Option<u32>,
    #[serde(default)]
    refine_factor: Option<u32>,
}

fn default_k() -> usize {
    10
}

async fn search(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dim = req.query_vector.len() as i32;
    let results = state
        .adapter
        .vector_search(
            &name,
            &state.vector_col,
            dim,
            req.query_vector,
            req.k,
            req.where_.as_deref(),
            req.columns,
            req.nprobes,
            req.refine_factor,
        )
        .await?;
    Ok(Json(serde_json::json!({"results": results})))
}

#[derive(Deserialize)]
struct SampleRequest {
    #[serde(default)]
    where_: Option<String>,
    #[serde(default = "default_k")]
    limit: usize,
    #[serde(default)]
    columns: Option<Vec<String>>,
}

async fn sample_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SampleRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state.adapter.export_jsonl(&name, req.where_.as_deref(), req.columns, req.limit, Some(req.limit)).await?;
    Ok(Json(serde_json::json!({"results": rows})))
}

#[derive(Deserialize)]
struct UpsertRequest {
    rows: Vec<Row>,
    #[serde(default = "default_id_col")]
    id_col: String,
    #[serde(default = "default_dtype")]
    vector_dtype: String,
}

fn default_id_col() -> String {
    "image_id".to_string()
}

fn default_dtype() -> String {
    "float32".to_string()
}

async fn upsert(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<UpsertRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.rows.is_empty() {
        return Err(TileidxError::poison("rows must be non-empty").into());
    }
    let dim = req
        .rows
        .first()
        .and_then(|r| r.get(&state.vector_col))
        .and_then(|v| v.as_array())
        .map(|a| a.len() as i32)
        .ok_or_else(|| TileidxError::poison("rows must include an 'embedding' field"))?;
    let dtype = VectorDType::parse(&req.vector_dtype).ok_or_else(|| TileidxError::poison("invalid vector_dtype"))?;

    let inserted = state.adapter.upsert(&name, &state.vector_col, dim, dtype, req.rows, &req.id_col).await?;
    Ok(Json(serde_json::json!({"inserted": inserted})))
}

#[derive(Deserialize)]
struct DeleteRequest {
    #[serde(rename = "where")]
    predicate: String,
}

async fn delete_rows(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (before, after) = state.adapter.delete_where(&name, &req.predicate).await?;
    Ok(Json(serde_json::json!({"rows_before": before, "rows_after": after})))
}

#[derive(Deserialize)]
struct ExportRequest {
    #[serde(default)]
    where_: Option<String>,
    #[serde(default = "default_page_size")]
    page_size: usize,
    #[serde(default)]
    max_rows: Option<usize>,
    #[serde(default)]
    columns: Option<Vec<String>>,
}

fn default_page_size() -> usize {
    5000
}

async fn export(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = state.adapter.export_jsonl(&name, req.where_.as_deref(), req.columns, req.page_size, req.max_rows).await?;
    Ok(Json(serde_json::json!({"written": rows.len(), "rows": rows})))
}

async fn optimize(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    state.adapter.optimize(&name).await?;
    Ok(Json(serde_json::json!({"status": "ok"})))
}
