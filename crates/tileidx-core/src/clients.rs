//! Thin HTTP clients for the registry and vector services, shared by the
//! scheduler, worker, and retriever processes (grounded on the source's
//! `TilesDBClient` / `VectorDBClient` HTTP wrappers).

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TileidxError};
use crate::tile::{Tile, TileStatus};

fn map_reqwest(operation: &str, e: reqwest::Error) -> TileidxError {
    TileidxError::transient(operation, e.to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_kind: String,
    message: String,
}

/// Map a non-2xx HTTP response to the matching `TileidxError` variant, the
/// way the worker's `VectorDBClient` treats `httpx.HTTPError` as a signal to
/// abandon the batch rather than crash.
async fn map_error_response(operation: &str, resp: reqwest::Response) -> TileidxError {
    let status = resp.status();
    let body: Option<ErrorBody> = resp.json().await.ok();
    let message = body.as_ref().map(|b| b.message.clone()).unwrap_or_else(|| status.to_string());
    match body.as_deref_kind() {
        Some("not_found") => TileidxError::NotFound { what: message },
        Some("invalid_state") => TileidxError::poison(message),
        Some("schema_conflict") => TileidxError::transient(operation, message),
        Some("dim_mismatch") => TileidxError::poison(message),
        _ if status == StatusCode::NOT_FOUND => TileidxError::NotFound { what: message },
        _ if status == StatusCode::SERVICE_UNAVAILABLE => TileidxError::transient(operation, message),
        _ => TileidxError::transient(operation, message),
    }
}

trait ErrorBodyExt {
    fn as_deref_kind(&self) -> Option<&str>;
}

impl ErrorBodyExt for Option<ErrorBody> {
    fn as_deref_kind(&self) -> Option<&str> {
        self.as_ref().map(|b| b.error_kind.as_str())
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(operation: &str, resp: reqwest::Response) -> Result<T> {
    if !resp.status().is_success() {
        return Err(map_error_response(operation, resp).await);
    }
    resp.json().await.map_err(|e| map_reqwest(operation, e))
}

#[derive(Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchUpsertRequest {
    pub tiles: Vec<Tile>,
}

#[derive(Debug, Serialize)]
struct BatchStatusUpdate<'a> {
    ids: &'a [String],
    status: &'a str,
}

impl RegistryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub async fn list_by_status(&self, status: TileStatus, limit: usize, offset: usize) -> Result<Vec<Tile>> {
        let url = format!("{}/tiles?status={}&limit={limit}&offset={offset}", self.base_url, status.as_str());
        let resp = self.http.get(url).send().await.map_err(|e| map_reqwest("registry list_by_status", e))?;
        decode_json("registry list_by_status", resp).await
    }

    pub async fn update_status(&self, ids: &[String], status: TileStatus) -> Result<usize> {
        let url = format!("{}/tiles/batch/status", self.base_url);
        let body = BatchStatusUpdate { ids, status: status.as_str() };
        let resp = self.http.post(url).json(&body).send().await.map_err(|e| map_reqwest("registry update_status", e))?;
        let value: serde_json::Value = decode_json("registry update_status", resp).await?;
        Ok(value.get("changed").and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    /// Expired-row discovery: the registry's HTTP surface exposes listing by
    /// status, so this walks `INDEXED` rows and leaves the `indexed_at`
    /// cutoff filter to the caller.
    pub async fn list_expired(&self, _cutoff_epoch: i64, limit: usize) -> Result<Vec<Tile>> {
        self.list_by_status(TileStatus::Indexed, limit, 0).await
    }

    pub async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for id in ids {
            let url = format!("{}/tiles/{}", self.base_url, id);
            let resp = self.http.delete(url).send().await.map_err(|e| map_reqwest("registry delete", e))?;
            let value: serde_json::Value = decode_json("registry delete", resp).await?;
            deleted += value.get("deleted").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        }
        Ok(deleted)
    }
}

#[derive(Clone)]
pub struct VectorClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct UpsertBody {
    rows: Vec<serde_json::Value>,
    id_col: String,
    vector_dtype: String,
}

#[derive(Debug, Serialize)]
struct DeleteWhereBody<'a> {
    #[serde(rename = "where")]
    predicate: &'a str,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query_vector: Vec<f32>,
    k: usize,
    #[serde(rename = "where_", skip_serializing_if = "Option::is_none")]
    predicate: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    columns: Option<Vec<String>>,
}

impl VectorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub async fn upsert(&self, table: &str, rows: Vec<serde_json::Value>, id_col: &str, vector_dtype: &str) -> Result<usize> {
        let url = format!("{}/tables/{}/upsert", self.base_url, table);
        let body = UpsertBody { rows, id_col: id_col.to_string(), vector_dtype: vector_dtype.to_string() };
        let resp = self.http.post(url).json(&body).send().await.map_err(|e| map_reqwest("vector upsert", e))?;
        let value: serde_json::Value = decode_json("vector upsert", resp).await?;
        Ok(value.get("inserted").and_then(|v| v.as_u64()).unwrap_or(0) as usize)
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let url = format!("{}/tables", self.base_url);
        let resp = self.http.get(url).send().await.map_err(|e| map_reqwest("vector list_tables", e))?;
        decode_json("vector list_tables", resp).await
    }

    pub async fn delete_where(&self, table: &str, predicate: &str) -> Result<()> {
        let url = format!("{}/tables/{}/delete", self.base_url, table);
        let resp = self.http.post(url).json(&DeleteWhereBody { predicate }).send().await.map_err(|e| map_reqwest("vector delete_where", e))?;
        let _: serde_json::Value = decode_json("vector delete_where", resp).await?;
        Ok(())
    }

    /// Destination-side idempotency probe (spec §4.5 dedup step 2): fetch
    /// whichever rows of `ids` already exist under `id_col` in `table`, so
    /// the worker can skip re-embedding/upserting them.
    pub async fn probe_existing(&self, table: &str, id_col: &str, ids: &[String]) -> Result<std::collections::HashSet<String>> {
        if ids.is_empty() {
            return Ok(std::collections::HashSet::new());
        }
        let in_list = ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
        let predicate = format!("{id_col} IN ({in_list})");
        let url = format!("{}/tables/{}/rows", self.base_url, table);
        let body = serde_json::json!({"where_": predicate, "limit": ids.len(), "columns": [id_col]});
        let resp = self.http.post(url).json(&body).send().await.map_err(|e| map_reqwest("vector probe_existing", e))?;
        if resp.status() == StatusCode::NOT_FOUND {
            // Table doesn't exist yet: nothing can already be present.
            return Ok(std::collections::HashSet::new());
        }
        let value: serde_json::Value = decode_json("vector probe_existing", resp).await?;
        let present = value
            .get("results")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|row| row.get(id_col).and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        Ok(present)
    }

    /// `vectorSearch`: returns ranked rows (with `_distance`) for a query
    /// vector, optionally filtered by a `where` predicate.
    pub async fn search(
        &self,
        table: &str,
        query_vector: Vec<f32>,
        k: usize,
        predicate: Option<&str>,
        columns: Option<Vec<String>>,
    ) -> Result<Vec<serde_json::Value>> {
        let url = format!("{}/tables/{}/search", self.base_url, table);
        let body = SearchBody { query_vector, k, predicate, columns };
        let resp = self.http.post(url).json(&body).send().await.map_err(|e| map_reqwest("vector search", e))?;
        let value: serde_json::Value = decode_json("vector search", resp).await?;
        Ok(value.get("results").and_then(|v| v.as_array()).cloned().unwrap_or_default())
    }
}
