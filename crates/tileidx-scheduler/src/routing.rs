//! Embedder queue routing table (spec §4.4): maps a tile's `embedder_model`
//! field — itself possibly a compound `"backend:model"` string — to the bus
//! queue its `IndexRequest` should land on.

use std::collections::HashMap;

/// Parsed form of the `TILEIDX_SCHEDULER_QUEUE_ROUTING` configuration
/// string. Entries are `backend=queue` or `backend:model=queue`,
/// comma-separated.
#[derive(Debug, Clone, Default)]
pub struct EmbedderQueues {
    /// `backend:model` -> queue, checked first (most specific).
    by_backend_model: HashMap<String, String>,
    /// `backend` -> queue, checked when no `backend:model` entry matches.
    by_backend: HashMap<String, String>,
    /// Queue used when neither a backend:model nor a backend mapping
    /// matches. Set from the first plain `backend=queue` entry parsed.
    default_queue: Option<String>,
}

impl EmbedderQueues {
    /// Resolve the queue name for a tile's `embedder_model` field, which may
    /// itself be a compound `"backend:model"` string (the ground truth has
    /// no separate backend field — routing keys on this one string, split
    /// internally when it contains a `:`).
    pub fn get_queue(&self, embedder_model: Option<&str>) -> &str {
        let Some(raw) = embedder_model.map(str::trim).filter(|s| !s.is_empty()) else {
            return self.default_queue.as_deref().unwrap_or("embed.default");
        };

        if let Some((backend, model)) = raw.split_once(':') {
            let key = format!("{}:{}", backend.trim(), model.trim());
            if let Some(q) = self.by_backend_model.get(&key) {
                return q;
            }
        }
        if let Some(q) = self.by_backend.get(raw) {
            return q;
        }
        self.default_queue.as_deref().unwrap_or("embed.default")
    }
}

/// Parse `"backend=queue,backend:model=queue,..."` into a routing table.
/// Malformed or empty entries are skipped with a warning, never fatal.
/// Later entries win on exact-key collisions. The default queue is set
/// from the first bare `backend=queue` mapping encountered, in parse
/// order (not the last).
pub fn parse_embedder_queues(spec: &str) -> EmbedderQueues {
    let mut table = EmbedderQueues::default();
    for raw_entry in spec.split(',') {
        let entry = raw_entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((key, queue)) = entry.split_once('=') else {
            tracing::warn!(entry, "skipping malformed queue routing entry");
            continue;
        };
        let key = key.trim();
        let queue = queue.trim();
        if key.is_empty() || queue.is_empty() {
            tracing::warn!(entry, "skipping queue routing entry with empty key or value");
            continue;
        }

        if let Some((backend, model)) = key.split_once(':') {
            if backend.is_empty() || model.is_empty() {
                tracing::warn!(entry, "skipping malformed backend:model routing entry");
                continue;
            }
            table.by_backend_model.insert(format!("{backend}:{model}"), queue.to_string());
        } else {
            if table.default_queue.is_none() {
                table.default_queue = Some(queue.to_string());
            }
            table.by_backend.insert(key.to_string(), queue.to_string());
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_model_wins_over_backend() {
        let t = parse_embedder_queues("clip=embed.clip,clip:vit-l=embed.clip.vitl");
        assert_eq!(t.get_queue(Some("clip:vit-l")), "embed.clip.vitl");
        assert_eq!(t.get_queue(Some("clip:vit-b")), "embed.clip");
    }

    #[test]
    fn unmatched_backend_falls_back_to_default() {
        let t = parse_embedder_queues("clip=embed.clip");
        assert_eq!(t.get_queue(Some("siglip2")), "embed.clip");
    }

    #[test]
    fn first_plain_mapping_becomes_default() {
        let t = parse_embedder_queues("clip=embed.clip,pe-core=embed.pecore");
        assert_eq!(t.get_queue(Some("unknown")), "embed.clip");
    }

    #[test]
    fn malformed_entries_are_skipped_not_fatal() {
        let t = parse_embedder_queues("clip=embed.clip,,garbage,=noqueue,noval=");
        assert_eq!(t.get_queue(Some("clip")), "embed.clip");
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let t = parse_embedder_queues("clip=embed.clip,clip=embed.clip.v2");
        assert_eq!(t.get_queue(Some("clip")), "embed.clip.v2");
    }

    #[test]
    fn no_match_and_no_default_uses_hardcoded_fallback() {
        let t = parse_embedder_queues("clip:vit-l=embed.clip.vitl");
        assert_eq!(t.get_queue(Some("clip:vit-b")), "embed.default");
    }

    #[test]
    fn compound_model_routes_via_backend_model_map() {
        let t = parse_embedder_queues("pe_core=tiles.to_index.pe_core,clip:ViT-B-32=tiles.to_index.clip");
        assert_eq!(t.get_queue(Some("clip:ViT-B-32")), "tiles.to_index.clip");
        assert_eq!(t.get_queue(Some("pe_core")), "tiles.to_index.pe_core");
        assert_eq!(t.get_queue(Some("siglip2")), "tiles.to_index.pe_core");
    }

    #[test]
    fn empty_string_model_falls_back_to_default() {
        let t = parse_embedder_queues("clip=embed.clip");
        assert_eq!(t.get_queue(Some("  ")), "embed.clip");
        assert_eq!(t.get_queue(None), "embed.clip");
    }
}
