//! Scheduler tick: promote READY_FOR_INDEXING tiles onto embedder queues,
//! then sweep rows past their TTL. Grounded on the source scheduler's
//! `run_once()` / daemon's `cleanup_expired_tiles()` pair: each phase is
//! isolated so a failure on one tile (or one vector table) never aborts
//! the rest of the batch.

use serde_json::json;
use tileidx_core::{RegistryClient, TileStatus, VectorClient};

use crate::routing::EmbedderQueues;

pub struct Scheduler {
    pub registry: RegistryClient,
    pub vector: VectorClient,
    pub bus: std::sync::Arc<dyn tileidx_bus::MessageBus>,
    pub routing: EmbedderQueues,
    pub batch_size: usize,
    pub ttl_secs: i64,
    pub sweep_limit: usize,
}

impl Scheduler {
    /// Promote one batch of ready tiles. Returns the number published.
    pub async fn run_once(&self) -> tileidx_core::Result<usize> {
        let ready = self.registry.list_by_status(TileStatus::ReadyForIndexing, self.batch_size, 0).await?;
        let mut published = 0;
        for tile in ready {
            if let Err(e) = self.promote_one(&tile).await {
                tracing::warn!(tile_id = %tile.tile_id, error = %e, "failed to promote tile, marking FAILED");
                if let Err(mark_err) = self.registry.update_status(&[tile.tile_id.clone()], TileStatus::Failed).await {
                    tracing::warn!(tile_id = %tile.tile_id, error = %mark_err, "failed to mark tile FAILED after promotion error");
                }
                continue;
            }
            published += 1;
        }
        Ok(published)
    }

    async fn promote_one(&self, tile: &tileidx_core::Tile) -> tileidx_core::Result<()> {
        let queue = self.routing.get_queue(tile.embedder_model.as_deref());

        // Mark IN_PROCESS before publish: a crash between these two steps
        // leaves the tile stuck (not silently reprocessed), matching the
        // at-most-once promotion contract in spec §4.4.
        self.registry.update_status(&[tile.tile_id.clone()], TileStatus::InProcess).await?;

        let payload = json!({
            "image_id": tile.image_id,
            "width": tile.width.unwrap_or_default(),
            "height": tile.height.unwrap_or_default(),
            "tile_id": tile.tile_id,
            "source": tile.source,
            "tile_store": tile.tile_store,
            "image_path": tile.image_path,
            "raster_path": tile.raster_path,
            "pixel_polygon": tile.pixel_polygon,
            "geo_polygon": tile.geo_polygon,
            "lat": tile.lat,
            "lon": tile.lon,
            "utm_zone": tile.utm_zone,
            "embedder_backend": tile.embedder_backend,
            "embedder_model": tile.embedder_model,
        });

        self.bus.publish(queue, &payload).await
    }

    /// Sweep rows whose `indexed_at` is older than the TTL cutoff out of
    /// both the vector tables and the tile registry.
    pub async fn sweep_expired(&self, now_epoch: i64) -> tileidx_core::Result<usize> {
        let cutoff = now_epoch - self.ttl_secs;
        let indexed = self.registry.list_expired(cutoff, self.sweep_limit).await?;
        let expired: Vec<_> = indexed.into_iter().filter(|t| t.indexed_at.is_some_and(|ts| ts <= cutoff)).collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let tables = self.vector.list_tables().await.unwrap_or_default();
        for table in &tables {
            if let Err(e) = self.vector.delete_where(table, &format!("indexed_at <= {cutoff}")).await {
                tracing::warn!(table, error = %e, "vector table TTL sweep failed, continuing");
            }
        }

        let ids: Vec<String> = expired.iter().map(|t| t.tile_id.clone()).collect();
        let deleted = self.registry.delete(&ids).await?;
        Ok(deleted)
    }
}
