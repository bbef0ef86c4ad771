//! Vector index adapter (spec §4.3 / C3): table lifecycle, idempotent
//! upsert, ANN search, maintenance. Grounded on the teacher's
//! `lancedb::connect` / `open_table` / `vector_search` call shape,
//! generalized from one fixed schema to the catalog-driven schema here and
//! from single-row insert to a merge-insert upsert path.

use std::path::PathBuf;

use arrow_array::{RecordBatch, RecordBatchIterator};
use dashmap::DashMap;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use tileidx_core::catalog;
use tileidx_core::{Result, TileidxError};

use crate::rows::{record_batch_to_rows, rows_to_record_batch, Row};
use crate::schema::{build_schema, vector_dim_from_schema, VectorDType};

pub struct TableInfo {
    pub table_name: String,
    pub vector_col: String,
    pub vector_dim: Option<i32>,
    pub row_count: Option<usize>,
    pub columns: Vec<String>,
}

/// Owns every vector table under one LanceDB directory. Table handles are
/// cached by name (spec §5: "table handles in C3 are cached by name").
pub struct VectorIndexAdapter {
    db_dir: PathBuf,
    connection: lancedb::Connection,
    dims: DashMap<String, i32>,
}

impl VectorIndexAdapter {
    pub async fn connect(db_dir: impl Into<PathBuf>) -> Result<Self> {
        let db_dir = db_dir.into();
        let connection = lancedb::connect(db_dir.to_string_lossy().as_ref())
            .execute()
            .await
            .map_err(|e| TileidxError::transient("lancedb connect", e.to_string()))?;
        Ok(Self { db_dir, connection, dims: DashMap::new() })
    }

    pub fn db_dir(&self) -> &std::path::Path {
        &self.db_dir
    }

    async fn open_table(&self, name: &str) -> Result<lancedb::Table> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| TileidxError::NotFound { what: format!("table '{name}': {e}") })
    }

    /// `createOrOpen(name, D, vector_dtype)`: fails with `SchemaConflict` if
    /// an existing table's vector column has a different dimension.
    pub async fn create_or_open(
        &self,
        name: &str,
        vector_col: &str,
        dim: i32,
        dtype: VectorDType,
    ) -> Result<()> {
        let existing = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| TileidxError::transient("lancedb table_names", e.to_string()))?;

        if existing.iter().any(|t| t == name) {
            let table = self.open_table(name).await?;
            let schema = table.schema().await.map_err(|e| TileidxError::transient("lancedb schema", e.to_string()))?;
            if let Some(found) = vector_dim_from_schema(&schema, vector_col) {
                if found != dim {
                    return Err(TileidxError::SchemaConflict {
                        table: name.to_string(),
                        expected: dim as usize,
                        found: found as usize,
                    });
                }
            }
            self.dims.insert(name.to_string(), dim);
            return Ok(());
        }

        let schema = build_schema(vector_col, dim, dtype);
        let empty = RecordBatch::new_empty(schema.clone());
        let reader = RecordBatchIterator::new(vec![Ok(empty)], schema);
        self.connection
            .create_table(name, Box::new(reader))
            .execute()
            .await
            .map_err(|e| TileidxError::transient("lancedb create_table", e.to_string()))?;
        self.dims.insert(name.to_string(), dim);
        Ok(())
    }

    /// Merge-insert upsert keyed on `id_col`, falling back to delete+insert
    /// when merge_insert isn't usable (spec §4.3 step 1/2).
    pub async fn upsert(
        &self,
        name: &str,
        vector_col: &str,
        dim: i32,
        dtype: VectorDType,
        rows: Vec<Row>,
        id_col: &str,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.create_or_open(name, vector_col, dim, dtype).await?;
        let table = self.open_table(name).await?;
        let schema = table.schema().await.map_err(|e| TileidxError::transient("lancedb schema", e.to_string()))?;
        let batch = rows_to_record_batch(&schema, &rows, vector_col, dim, dtype)?;
        let n = batch.num_rows();

        // Opportunistic scalar index on the join key; failure is non-fatal.
        if let Err(e) = table
            .create_index(&[id_col], lancedb::index::Index::BTree(Default::default()))
            .execute()
            .await
        {
            tracing::debug!(error = %e, column = id_col, "scalar index creation skipped");
        }

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema.clone());
        let merge_result = table
            .merge_insert(&[id_col])
            .when_matched_update_all(None)
            .when_not_matched_insert_all()
            .execute(Box::new(reader))
            .await;

        if let Err(e) = merge_result {
            tracing::warn!(error = %e, table = name, "merge_insert unavailable, falling back to delete+add");
            let ids: Vec<String> = rows
                .iter()
                .filter_map(|r| r.get(id_col).and_then(|v| v.as_str().map(str::to_string)))
                .collect();
            if !ids.is_empty() {
                let in_clause = ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(", ");
                let predicate = format!("{id_col} IN ({in_clause})");
                table.delete(&predicate).await.map_err(|e| TileidxError::transient("lancedb delete", e.to_string()))?;
            }
            let batch = rows_to_record_batch(&schema, &rows, vector_col, dim, dtype)?;
            let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
            table.add(Box::new(reader)).execute().await.map_err(|e| TileidxError::transient("lancedb add", e.to_string()))?;
        }

        Ok(n)
    }

    /// `vectorSearch`: input vector length must equal `D`.
    #[allow(clippy::too_many_arguments)]
    pub async fn vector_search(
        &self,
        name: &str,
        vector_col: &str,
        dim: i32,
        query: Vec<f32>,
        k: usize,
        where_clause: Option<&str>,
        columns: Option<Vec<String>>,
        nprobes: Option<u32>,
        refine_factor: Option<u32>,
    ) -> Result<Vec<Row>> {
        if query.len() != dim as usize {
            return Err(TileidxError::DimMismatch { expected: dim as usize, got: query.len() });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let table = self.open_table(name).await?;
        let schema = table.schema().await.map_err(|e| TileidxError::transient("lancedb schema", e.to_string()))?;
        let existing_columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();

        let mut q = table.query().nearest_to(query).map_err(|e| TileidxError::Internal(e.to_string()))?.column(vector_col);

        if let Some(w) = where_clause {
            q = q.only_if(w);
        }
        if let Some(n) = nprobes {
            q = q.nprobes(n as usize);
        }
        if let Some(r) = refine_factor {
            q = q.refine_factor(r);
        }

        let projection = columns.unwrap_or_else(|| catalog::default_search_projection(&existing_columns));
        if !projection.is_empty() {
            q = q.select(lancedb::query::Select::Columns(projection));
        }

        let batches: Vec<RecordBatch> = q
            .limit(k)
            .execute()
            .await
            .map_err(|e| TileidxError::transient("lancedb vector_search", e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| TileidxError::transient("lancedb vector_search stream", e.to_string()))?;

        Ok(batches.iter().flat_map(record_batch_to_rows).collect())
    }

    pub async fn optimize(&self, name: &str) -> Result<()> {
        let table = self.open_table(name).await?;
        table.optimize(lancedb::table::OptimizeAction::All).await.map_err(|e| TileidxError::transient("lancedb optimize", e.to_string()))?;
        Ok(())
    }

    /// Returns (rows_before, rows_after).
    pub async fn delete_where(&self, name: &str, expr: &str) -> Result<(Option<usize>, Option<usize>)> {
        let table = self.open_table(name).await?;
        let before = table.count_rows(None).await.ok();
        table.delete(expr).await.map_err(|e| TileidxError::transient("lancedb delete", e.to_string()))?;
        let after = table.count_rows(None).await.ok();
        Ok((before, after))
    }

    pub async fn export_jsonl(
        &self,
        name: &str,
        where_clause: Option<&str>,
        columns: Option<Vec<String>>,
        page_size: usize,
        max_rows: Option<usize>,
    ) -> Result<Vec<Row>> {
        let table = self.open_table(name).await?;
        let mut written = Vec::new();
        let mut offset = 0usize;

        loop {
            let mut limit = page_size;
            if let Some(max) = max_rows {
                let remaining = max.saturating_sub(written.len());
                if remaining == 0 {
                    break;
                }
                limit = limit.min(remaining);
            }

            let mut q = table.query();
            if let Some(w) = where_clause {
                q = q.only_if(w);
            }
            if let Some(cols) = &columns {
                q = q.select(lancedb::query::Select::Columns(cols.clone()));
            }

            let batches: Vec<RecordBatch> = q
                .limit(limit)
                .offset(offset)
                .execute()
                .await
                .map_err(|e| TileidxError::transient("lancedb export", e.to_string()))?
                .try_collect()
                .await
                .map_err(|e| TileidxError::transient("lancedb export stream", e.to_string()))?;

            let page: Vec<Row> = batches.iter().flat_map(record_batch_to_rows).collect();
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            written.extend(page);
            offset += page_size;
            if page_len < limit {
                break;
            }
        }

        Ok(written)
    }

    pub async fn table_info(&self, name: &str, vector_col: &str) -> Result<TableInfo> {
        let table = self.open_table(name).await?;
        let schema = table.schema().await.map_err(|e| TileidxError::transient("lancedb schema", e.to_string()))?;
        let row_count = table.count_rows(None).await.ok();
        Ok(TableInfo {
            table_name: name.to_string(),
            vector_col: vector_col.to_string(),
            vector_dim: vector_dim_from_schema(&schema, vector_col),
            row_count,
            columns: schema.fields().iter().map(|f| f.name().clone()).collect(),
        })
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.connection.table_names().execute().await.map_err(|e| TileidxError::transient("lancedb table_names", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: &str, embedding: Vec<f32>) -> Row {
        let mut r = Row::new();
        r.insert("id".to_string(), json!(id));
        r.insert("tile_id".to_string(), json!(id));
        r.insert("image_id".to_string(), json!(1));
        r.insert("embedding".to_string(), json!(embedding));
        r
    }

    #[tokio::test]
    async fn upsert_then_search_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = VectorIndexAdapter::connect(dir.path()).await.unwrap();

        let rows = vec![row("orthophoto:0/0/0", vec![1.0, 0.0, 0.0])];
        let inserted = adapter
            .upsert("orthophoto_pe_core", "embedding", 3, VectorDType::Float32, rows, "id")
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let results = adapter
            .vector_search("orthophoto_pe_core", "embedding", 3, vec![1.0, 0.0, 0.0], 1, None, None, None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_not_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = VectorIndexAdapter::connect(dir.path()).await.unwrap();

        adapter
            .upsert("t", "embedding", 2, VectorDType::Float32, vec![row("a", vec![1.0, 0.0])], "id")
            .await
            .unwrap();
        adapter
            .upsert("t", "embedding", 2, VectorDType::Float32, vec![row("a", vec![0.0, 1.0])], "id")
            .await
            .unwrap();

        let info = adapter.table_info("t", "embedding").await.unwrap();
        assert_eq!(info.row_count, Some(1));
    }

    #[tokio::test]
    async fn create_or_open_rejects_dimension_change() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = VectorIndexAdapter::connect(dir.path()).await.unwrap();

        adapter.create_or_open("t", "embedding", 768, VectorDType::Float32).await.unwrap();
        let err = adapter.create_or_open("t", "embedding", 1024, VectorDType::Float32).await;
        assert!(matches!(err, Err(TileidxError::SchemaConflict { .. })));
    }

    #[tokio::test]
    async fn search_with_k_zero_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = VectorIndexAdapter::connect(dir.path()).await.unwrap();
        adapter.create_or_open("t", "embedding", 2, VectorDType::Float32).await.unwrap();

        let results = adapter.vector_search("t", "embedding", 2, vec![0.0, 0.0], 0, None, None, None, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn empty_upsert_returns_zero_without_creating_table() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = VectorIndexAdapter::connect(dir.path()).await.unwrap();
        let count = adapter.upsert("t", "embedding", 2, VectorDType::Float32, vec![], "id").await.unwrap();
        assert_eq!(count, 0);
        assert!(adapter.list_tables().await.unwrap().is_empty());
    }
}

