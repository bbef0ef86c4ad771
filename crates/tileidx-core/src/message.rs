//! Bus wire payload (spec §6): the stable JSON contract between the
//! scheduler (producer) and embedder workers (consumers).

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileidxError};
use crate::tile::TileSource;

/// Message payload published to an embedding queue. Unknown JSON fields are
/// ignored by serde's default deny-nothing behavior; required fields missing
/// at decode time are a `Poison` error, not a parse panic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    pub image_id: i64,
    pub width: i32,
    pub height: i32,

    #[serde(default)]
    pub tile_id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tile_store: Option<String>,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub raster_path: Option<String>,
    #[serde(default)]
    pub pixel_polygon: Option<String>,
    #[serde(default)]
    pub geo_polygon: Option<String>,
    #[serde(default)]
    pub out_width: Option<i32>,
    #[serde(default)]
    pub out_height: Option<i32>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub utm_zone: Option<String>,
    #[serde(default)]
    pub embedder_backend: Option<String>,
    #[serde(default)]
    pub embedder_model: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl IndexRequest {
    /// Parse and validate a raw bus payload, surfacing missing/invalid
    /// required fields as a `Poison` error (mark FAILED, ack, log once).
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let req: Self = serde_json::from_slice(bytes)
            .map_err(|e| TileidxError::poison(format!("malformed message payload: {e}")))?;
        req.tile_source()?;
        Ok(req)
    }

    /// Resolve the tagged tile-source variant this payload implies.
    pub fn tile_source(&self) -> Result<TileSource> {
        TileSource::from_fields(
            self.tile_store.as_deref(),
            self.image_path.as_deref(),
            self.raster_path.as_deref(),
            self.pixel_polygon.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_payload() {
        let raw = br#"{"image_id":1,"width":512,"height":512,"image_path":"/x.png"}"#;
        let req = IndexRequest::from_json(raw).unwrap();
        assert_eq!(req.image_id, 1);
        assert!(req.tile_source().is_ok());
    }

    #[test]
    fn ignores_unknown_fields() {
        let raw = br#"{"image_id":1,"width":1,"height":1,"image_path":"/x.png","bogus_extra":42}"#;
        assert!(IndexRequest::from_json(raw).is_ok());
    }

    #[test]
    fn missing_required_field_is_poison() {
        let raw = br#"{"image_id":1,"width":1}"#;
        assert!(IndexRequest::from_json(raw).is_err());
    }

    #[test]
    fn missing_source_fields_is_poison() {
        let raw = br#"{"image_id":1,"width":1,"height":1}"#;
        assert!(IndexRequest::from_json(raw).is_err());
    }
}
