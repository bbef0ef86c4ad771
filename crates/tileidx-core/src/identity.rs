//! Canonical tile identity (spec §4.7).
//!
//! `TileKey` captures the coordinates a generator cuts a tile from; the
//! canonical id derived from it is the primary key used everywhere else in
//! the fabric (tile registry rows, vector row ids, bus payload `tile_id`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `(source, z, x, y, variant?)` — the coordinates a tile is cut from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileKey {
    pub source: String,
    pub z: u32,
    pub x: u32,
    pub y: u32,
    pub variant: Option<String>,
}

impl TileKey {
    pub fn new(source: impl Into<String>, z: u32, x: u32, y: u32) -> Self {
        Self {
            source: source.into(),
            z,
            x,
            y,
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }
}

/// Stable canonical string form: `"{source}:{z}/{x}/{y}:{variant}"`, with the
/// trailing `:{variant}` segment present only when `variant` is `Some`
/// (including `Some("")`) — so `variant: None` and `variant: Some(String::new())`
/// never collide, preserving field-by-field injectivity.
pub fn canonical_tile_id(key: &TileKey) -> String {
    let base = format!("{}:{}/{}/{}", key.source, key.z, key.x, key.y);
    match &key.variant {
        Some(variant) => format!("{base}:{variant}"),
        None => base,
    }
}

/// Short, deterministic hash of a tile id (first 16 hex chars of SHA-256),
/// used where a fixed-length key is needed (e.g. cache shard keys).
pub fn tile_id_hash(tile_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tile_id.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_id_strips_trailing_variant_separator() {
        let key = TileKey::new("orthophoto", 0, 0, 0);
        assert_eq!(canonical_tile_id(&key), "orthophoto:0/0/0");
    }

    #[test]
    fn canonical_id_keeps_variant() {
        let key = TileKey::new("coco", 10, 512, 384).with_variant("train");
        assert_eq!(canonical_tile_id(&key), "coco:10/512/384:train");
    }

    #[test]
    fn identical_keys_produce_identical_ids() {
        let a = TileKey::new("dota", 3, 1, 2);
        let b = TileKey::new("dota", 3, 1, 2);
        assert_eq!(canonical_tile_id(&a), canonical_tile_id(&b));
    }

    #[test]
    fn differing_fields_produce_differing_ids() {
        let a = TileKey::new("dota", 3, 1, 2);
        let b = TileKey::new("dota", 3, 1, 3);
        assert_ne!(canonical_tile_id(&a), canonical_tile_id(&b));
    }

    #[test]
    fn no_variant_and_empty_variant_do_not_collide() {
        let none = TileKey::new("dota", 3, 1, 2);
        let empty = TileKey::new("dota", 3, 1, 2).with_variant("");
        assert_ne!(none, empty);
        assert_ne!(canonical_tile_id(&none), canonical_tile_id(&empty));
    }

    #[test]
    fn hash_is_fixed_length_and_deterministic() {
        let h1 = tile_id_hash("orthophoto:0/0/0");
        let h2 = tile_id_hash("orthophoto:0/0/0");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 16);
    }
}
