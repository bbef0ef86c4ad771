//! Sled-backed tile registry (spec §4.1 / C1).
//!
//! Storage is single-writer, row-oriented key/value: `tile_id` is the sled
//! key, the JSON-encoded `Tile` is the value. An in-memory cache mirrors hot
//! rows the way the teacher's sled-backed store layers a `DashMap` read
//! cache in front of `sled::Db`.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tileidx_core::{Result, Tile, TileStatus, TileidxError};

pub struct TileRegistry {
    db: Arc<sled::Db>,
    cache: Arc<DashMap<String, Tile>>,
}

impl TileRegistry {
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path).map_err(|e| TileidxError::transient("sled open", e.to_string()))?;
        Ok(Self { db: Arc::new(db), cache: Arc::new(DashMap::new()) })
    }

    fn put(&self, tile: &Tile) -> Result<()> {
        let bytes = serde_json::to_vec(tile)?;
        self.db
            .insert(tile.tile_id.as_bytes(), bytes)
            .map_err(|e| TileidxError::transient("sled insert", e.to_string()))?;
        self.cache.insert(tile.tile_id.clone(), tile.clone());
        Ok(())
    }

    fn read_one(&self, tile_id: &str) -> Result<Option<Tile>> {
        if let Some(hit) = self.cache.get(tile_id) {
            return Ok(Some(hit.clone()));
        }
        match self.db.get(tile_id.as_bytes()).map_err(|e| TileidxError::transient("sled get", e.to_string()))? {
            Some(bytes) => {
                let tile: Tile = serde_json::from_slice(&bytes)?;
                self.cache.insert(tile_id.to_string(), tile.clone());
                Ok(Some(tile))
            }
            None => Ok(None),
        }
    }

    /// Scan every row. Schema is additive: rows from an older writer that
    /// are missing fields still decode (`serde(default)` on optional
    /// columns), so no migration step is required here.
    fn scan_all(&self) -> Result<Vec<Tile>> {
        let mut out = Vec::new();
        for entry in self.db.iter() {
            let (_key, value) = entry.map_err(|e| TileidxError::transient("sled iter", e.to_string()))?;
            let tile: Tile = serde_json::from_slice(&value)?;
            out.push(tile);
        }
        Ok(out)
    }

    /// Insert-or-update by `tile_id`; status defaults to `READY_FOR_INDEXING`
    /// for genuinely new rows unless the caller set one explicitly.
    pub fn upsert_tiles(&self, tiles: Vec<Tile>) -> Result<usize> {
        let mut count = 0;
        for tile in tiles {
            self.put(&tile)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, tile_id: &str) -> Result<Option<Tile>> {
        self.read_one(tile_id)
    }

    /// Page of rows with the given status, ordered by `tile_id` (sled's
    /// natural key order).
    pub fn list_by_status(&self, status: TileStatus, limit: usize, offset: usize) -> Result<Vec<Tile>> {
        let mut matching: Vec<Tile> = self
            .scan_all()?
            .into_iter()
            .filter(|t| t.status == status)
            .collect();
        matching.sort_by(|a, b| a.tile_id.cmp(&b.tile_id));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    /// Batch status update, enforcing the §4.1 transition DAG per row. A
    /// single illegal transition is skipped (logged), not fatal to the
    /// batch — mirrors the worker's one-bad-envelope isolation policy.
    pub fn update_status(&self, ids: &[String], to: TileStatus) -> Result<usize> {
        let mut changed = 0;
        for id in ids {
            let Some(mut tile) = self.read_one(id)? else {
                tracing::warn!(tile_id = %id, "update_status: tile not found");
                continue;
            };
            match tile.status.validate_transition(to) {
                Ok(()) => {
                    if tile.status == to {
                        continue; // idempotent no-op, not counted as a change
                    }
                    tile.status = to;
                    tile.indexed_at = if to == TileStatus::Indexed {
                        Some(chrono::Utc::now().timestamp())
                    } else {
                        None
                    };
                    self.put(&tile)?;
                    changed += 1;
                }
                Err(_) => {
                    tracing::warn!(
                        tile_id = %id,
                        from = tile.status.as_str(),
                        to = to.as_str(),
                        "illegal transition rejected"
                    );
                }
            }
        }
        Ok(changed)
    }

    pub fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut count = 0;
        for id in ids {
            if self
                .db
                .remove(id.as_bytes())
                .map_err(|e| TileidxError::transient("sled remove", e.to_string()))?
                .is_some()
            {
                count += 1;
            }
            self.cache.remove(id);
        }
        Ok(count)
    }

    pub fn status_counts(&self) -> Result<HashMap<String, usize>> {
        let mut counts = HashMap::new();
        for tile in self.scan_all()? {
            *counts.entry(tile.status.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Rows past TTL: `indexed_at <= cutoff_epoch`, for the scheduler's TTL sweep.
    pub fn list_expired(&self, cutoff_epoch: i64, limit: usize) -> Result<Vec<Tile>> {
        let mut expired: Vec<Tile> = self
            .scan_all()?
            .into_iter()
            .filter(|t| t.indexed_at.is_some_and(|ts| ts <= cutoff_epoch))
            .collect();
        expired.sort_by(|a, b| a.tile_id.cmp(&b.tile_id));
        expired.truncate(limit);
        Ok(expired)
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| TileidxError::transient("sled flush", e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tileidx_core::TileStatus::*;

    fn tile(id: &str, status: tileidx_core::TileStatus) -> Tile {
        Tile {
            tile_id: id.to_string(),
            image_id: 1,
            source: Some("orthophoto".to_string()),
            tile_store: Some("local".to_string()),
            image_path: Some("/x.png".to_string()),
            raster_path: None,
            pixel_polygon: None,
            geo_polygon: None,
            lat: None,
            lon: None,
            utm_zone: None,
            width: Some(512),
            height: Some(512),
            status,
            indexed_at: None,
            embedder_backend: None,
            embedder_model: None,
        }
    }

    fn temp_registry() -> TileRegistry {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let nonce = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "tileidx-test-{}-{}-{}",
            std::process::id(),
            nonce,
            std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos()
        ));
        TileRegistry::open(dir.to_str().unwrap()).unwrap()
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let reg = temp_registry();
        reg.upsert_tiles(vec![tile("a", ReadyForIndexing)]).unwrap();
        let got = reg.get("a").unwrap().unwrap();
        assert_eq!(got.tile_id, "a");
        assert_eq!(got.status, ReadyForIndexing);
    }

    #[test]
    fn list_by_status_is_ordered_by_tile_id() {
        let reg = temp_registry();
        reg.upsert_tiles(vec![tile("b", ReadyForIndexing), tile("a", ReadyForIndexing)]).unwrap();
        let page = reg.list_by_status(ReadyForIndexing, 10, 0).unwrap();
        assert_eq!(page.iter().map(|t| t.tile_id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn update_status_sets_indexed_at_on_indexed() {
        let reg = temp_registry();
        reg.upsert_tiles(vec![tile("a", WaitingForIndex)]).unwrap();
        let changed = reg.update_status(&["a".to_string()], Indexed).unwrap();
        assert_eq!(changed, 1);
        let got = reg.get("a").unwrap().unwrap();
        assert!(got.indexed_at.is_some());
    }

    #[test]
    fn illegal_transition_is_skipped_not_fatal() {
        let reg = temp_registry();
        reg.upsert_tiles(vec![tile("a", ReadyForIndexing)]).unwrap();
        let changed = reg.update_status(&["a".to_string()], Indexed).unwrap();
        assert_eq!(changed, 0);
        assert_eq!(reg.get("a").unwrap().unwrap().status, ReadyForIndexing);
    }

    #[test]
    fn repeated_transition_is_idempotent_not_counted() {
        let reg = temp_registry();
        reg.upsert_tiles(vec![tile("a", InProcess)]).unwrap();
        let changed = reg.update_status(&["a".to_string()], InProcess).unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn status_counts_reflects_rows() {
        let reg = temp_registry();
        reg.upsert_tiles(vec![tile("a", ReadyForIndexing), tile("b", Failed)]).unwrap();
        let counts = reg.status_counts().unwrap();
        assert_eq!(counts.get("READY_FOR_INDEXING"), Some(&1));
        assert_eq!(counts.get("FAILED"), Some(&1));
    }

    #[test]
    fn delete_removes_row_and_counts() {
        let reg = temp_registry();
        reg.upsert_tiles(vec![tile("a", ReadyForIndexing)]).unwrap();
        assert_eq!(reg.delete(&["a".to_string()]).unwrap(), 1);
        assert!(reg.get("a").unwrap().is_none());
    }

    #[test]
    fn list_expired_filters_by_indexed_at() {
        let reg = temp_registry();
        let mut t = tile("a", Indexed);
        t.indexed_at = Some(100);
        reg.upsert_tiles(vec![t]).unwrap();
        let expired = reg.list_expired(200, 10).unwrap();
        assert_eq!(expired.len(), 1);
        let not_expired = reg.list_expired(50, 10).unwrap();
        assert!(not_expired.is_empty());
    }
}
