//! Consumer loop: batches `IndexRequest` messages, coalesces by size or age,
//! groups by `(embedder_backend, embedder_model)`, embeds, and upserts.
//! Grounded on the source worker's `process_batch()`/batch-flush loop,
//! generalized from a PIL/HTTP pipeline to the pure-function embedder here.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tileidx_bus::{Consumer, MessageEnvelope};
use tileidx_core::{IndexRequest, RegistryClient, TileStatus, VectorClient};
use tokio::signal;
use tokio::sync::Semaphore;

use crate::config::WorkerConfig;
use crate::embedder::{embed_batch, TileImage};

pub struct Worker {
    pub registry: RegistryClient,
    pub vector: VectorClient,
    pub config: WorkerConfig,
    pub decode_permits: Arc<Semaphore>,
    /// Process-local memo of `image_id`s seen this run (dedup step 1,
    /// spec §4.5): short-circuits duplicate deliveries before any load or
    /// embed work happens.
    pub seen_image_ids: Mutex<HashSet<i64>>,
}

struct Pending {
    req: IndexRequest,
    envelope: MessageEnvelope,
}

struct Loaded {
    req: IndexRequest,
    envelope: MessageEnvelope,
    image: TileImage,
    backend: String,
    model: String,
    table: String,
}

fn tile_id_for(req: &IndexRequest) -> String {
    req.tile_id.clone().unwrap_or_else(|| format!("tile:{}", req.image_id))
}

fn sanitize_token(value: &str) -> String {
    value.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

fn resolve_table_name(config: &WorkerConfig, model: &str) -> String {
    if !config.table_name.trim().is_empty() {
        return config.table_name.clone();
    }
    format!("tiles_{}", sanitize_token(&model.to_lowercase().replace('-', "_")))
}

/// Resolves on SIGINT or (on unix) SIGTERM, whichever comes first — the
/// shutdown flag the coordination loop observes between iterations (spec
/// §5, §6 exit-code-0-on-signal).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

impl Worker {
    pub async fn run(&self, mut consumer: Box<dyn Consumer>) {
        let mut batch: Vec<Pending> = Vec::new();
        let mut last_flush = tokio::time::Instant::now();
        let flush_interval = Duration::from_secs(self.config.flush_interval_secs);

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received, draining in-flight batch");
                    if !batch.is_empty() {
                        self.process_batch(std::mem::take(&mut batch)).await;
                    }
                    break;
                }
                polled = consumer.poll_next() => {
                    match polled {
                        Ok(Some(envelope)) => {
                            match IndexRequest::from_json(envelope.payload.to_string().as_bytes()) {
                                Ok(req) => {
                                    let already_seen = {
                                        let mut seen = self.seen_image_ids.lock().unwrap();
                                        !seen.insert(req.image_id)
                                    };
                                    if already_seen {
                                        tracing::debug!(image_id = req.image_id, "duplicate delivery within this run, acking without reprocessing");
                                        let _ = envelope.ack().await;
                                        continue;
                                    }
                                    batch.push(Pending { req, envelope });
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "dropping malformed index request");
                                    let _ = envelope.nack(false).await;
                                    continue;
                                }
                            }
                            if batch.len() >= self.config.batch_size {
                                self.process_batch(std::mem::take(&mut batch)).await;
                                last_flush = tokio::time::Instant::now();
                            }
                        }
                        Ok(None) => {
                            if !batch.is_empty() && last_flush.elapsed() >= flush_interval {
                                self.process_batch(std::mem::take(&mut batch)).await;
                                last_flush = tokio::time::Instant::now();
                            }
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "consumer poll failed; draining local batch for redelivery");
                            batch.clear();
                            tokio::time::sleep(Duration::from_secs(2)).await;
                        }
                    }
                }
            }
        }
    }

    async fn process_batch(&self, pending: Vec<Pending>) {
        if pending.is_empty() {
            return;
        }

        let tile_ids: Vec<String> = pending.iter().map(|p| tile_id_for(&p.req)).collect();
        self.update_status_best_effort(&tile_ids, TileStatus::WaitingForEmbedding).await;

        let mut loads = Vec::with_capacity(pending.len());
        for p in pending {
            let permit = self.decode_permits.clone().acquire_owned().await.expect("decode semaphore never closes");
            let timeout = Duration::from_secs(self.config.job_timeout_secs);
            let tile_id = tile_id_for(&p.req);
            let width = p.req.width;
            let height = p.req.height;
            let loaded = tokio::time::timeout(timeout, async move {
                let _permit = permit;
                TileImage { tile_id, width, height }
            })
            .await;
            loads.push((p, loaded));
        }

        let mut ok: Vec<Loaded> = Vec::new();
        for (p, loaded) in loads {
            match loaded {
                Ok(image) => {
                    let backend = p.req.embedder_backend.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| self.config.embedder_backend.clone());
                    let model = p.req.embedder_model.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| self.config.embedder_model.clone());
                    let table = resolve_table_name(&self.config, &model);
                    ok.push(Loaded { req: p.req, envelope: p.envelope, image, backend, model, table });
                }
                Err(_) => {
                    let tile_id = tile_id_for(&p.req);
                    tracing::warn!(tile_id, "tile load timed out; marking FAILED");
                    self.update_status_best_effort(&[tile_id], TileStatus::Failed).await;
                    let _ = p.envelope.ack().await;
                }
            }
        }

        if ok.is_empty() {
            return;
        }

        let mut groups: HashMap<(String, String), Vec<Loaded>> = HashMap::new();
        for item in ok {
            groups.entry((item.backend.clone(), item.model.clone())).or_default().push(item);
        }

        for ((backend, model), group) in groups {
            // Destination-side idempotency (dedup step 2): skip rows already
            // present in the target table, acking them as already-INDEXED.
            let mut by_table: HashMap<String, Vec<Loaded>> = HashMap::new();
            for item in group {
                by_table.entry(item.table.clone()).or_default().push(item);
            }
            let mut group = Vec::new();
            for (table, items) in by_table {
                let candidate_ids: Vec<String> = items.iter().map(|i| tile_id_for(&i.req)).collect();
                let present = self.vector.probe_existing(&table, "id", &candidate_ids).await.unwrap_or_default();
                for item in items {
                    let tile_id = tile_id_for(&item.req);
                    if present.contains(&tile_id) {
                        tracing::debug!(tile_id, table, "already indexed at destination, acking without re-embedding");
                        let _ = item.envelope.ack().await;
                    } else {
                        group.push(item);
                    }
                }
            }
            if group.is_empty() {
                continue;
            }

            let images: Vec<TileImage> = group.iter().map(|i| i.image.clone()).collect();
            let embeddings = embed_batch(&images, &backend, &model);

            let tile_ids: Vec<String> = group.iter().map(|i| tile_id_for(&i.req)).collect();
            self.update_status_best_effort(&tile_ids, TileStatus::WaitingForIndex).await;

            let mut rows_by_table: HashMap<String, Vec<Value>> = HashMap::new();
            let mut ids_by_table: HashMap<String, Vec<String>> = HashMap::new();
            let mut envelopes: HashMap<String, Vec<&MessageEnvelope>> = HashMap::new();

            for (item, emb) in group.iter().zip(embeddings.iter()) {
                let tile_id = tile_id_for(&item.req);
                let row = json!({
                    "id": tile_id,
                    "tile_id": tile_id,
                    "image_id": item.req.image_id,
                    "image_path": item.req.image_path,
                    "width": item.req.width,
                    "height": item.req.height,
                    "run_id": item.req.run_id,
                    "source": item.req.source,
                    "raster_path": item.req.raster_path,
                    "pixel_polygon": item.req.pixel_polygon,
                    "geo_polygon": item.req.geo_polygon,
                    "lat": item.req.lat,
                    "lon": item.req.lon,
                    "utm_zone": item.req.utm_zone,
                    "tile_store": item.req.tile_store,
                    "embedder_backend": backend,
                    "embedder_model": model,
                    "embedding": emb,
                });
                rows_by_table.entry(item.table.clone()).or_default().push(row);
                ids_by_table.entry(item.table.clone()).or_default().push(tile_id);
                envelopes.entry(item.table.clone()).or_default().push(&item.envelope);
            }

            for (table, rows) in rows_by_table {
                let n = rows.len();
                match self.vector.upsert(&table, rows, "id", "float32").await {
                    Ok(_) => {
                        let ids = ids_by_table.remove(&table).unwrap_or_default();
                        self.update_status_best_effort(&ids, TileStatus::Indexed).await;
                        if let Some(envs) = envelopes.remove(&table) {
                            for e in envs {
                                let _ = e.ack().await;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(table, rows = n, error = %e, "vector upsert failed; leaving batch unacked for redelivery");
                    }
                }
            }
        }
    }

    async fn update_status_best_effort(&self, ids: &[String], status: TileStatus) {
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.registry.update_status(ids, status).await {
            tracing::warn!(error = %e, status = status.as_str(), "status update failed, continuing");
        }
    }
}
