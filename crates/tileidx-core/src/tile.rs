//! Tile entity and lifecycle state machine (spec §3, §4.1).

use serde::{Deserialize, Serialize};

use crate::error::{Result, TileidxError};

/// Lifecycle status of a tile row in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TileStatus {
    ReadyForIndexing,
    InProcess,
    WaitingForEmbedding,
    WaitingForIndex,
    Indexed,
    Failed,
}

impl TileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadyForIndexing => "READY_FOR_INDEXING",
            Self::InProcess => "IN_PROCESS",
            Self::WaitingForEmbedding => "WAITING_FOR_EMBEDDING",
            Self::WaitingForIndex => "WAITING_FOR_INDEX",
            Self::Indexed => "INDEXED",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "READY_FOR_INDEXING" => Some(Self::ReadyForIndexing),
            "IN_PROCESS" => Some(Self::InProcess),
            "WAITING_FOR_EMBEDDING" => Some(Self::WaitingForEmbedding),
            "WAITING_FOR_INDEX" => Some(Self::WaitingForIndex),
            "INDEXED" => Some(Self::Indexed),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Indexed | Self::Failed)
    }

    /// Validate a transition per the §4.1 DAG. Repeating the current status
    /// is always a no-op (idempotent); anything off-DAG is `InvalidState`.
    pub fn validate_transition(self, to: Self) -> Result<()> {
        if self == to {
            return Ok(());
        }
        let allowed = matches!(
            (self, to),
            (Self::ReadyForIndexing, Self::InProcess)
                | (Self::InProcess, Self::WaitingForEmbedding)
                | (Self::WaitingForEmbedding, Self::WaitingForIndex)
                | (Self::WaitingForIndex, Self::Indexed)
                | (Self::Indexed, Self::ReadyForIndexing)
        ) || (!self.is_terminal() && to == Self::Failed);

        if allowed {
            Ok(())
        } else {
            Err(TileidxError::InvalidState {
                tile_id: String::new(),
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl Default for TileStatus {
    fn default() -> Self {
        Self::ReadyForIndexing
    }
}

/// Tagged variant replacing the source material's union-typed tile source
/// (spec §9 REDESIGN FLAGS): the bus-facing decoder picks a variant from
/// `tile_store` plus the presence of `image_path` vs `pixel_polygon`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tile_store", rename_all = "snake_case")]
pub enum TileSource {
    Local { image_path: String },
    RasterWindow { raster_path: String, pixel_polygon: String },
    Synthetic,
}

impl TileSource {
    /// Build the variant implied by a (possibly partial) set of fields, the
    /// way a bus-facing decoder must since producers only send what their
    /// variant needs.
    pub fn from_fields(
        tile_store: Option<&str>,
        image_path: Option<&str>,
        raster_path: Option<&str>,
        pixel_polygon: Option<&str>,
    ) -> Result<Self> {
        match tile_store {
            Some("local") | Some("orthophoto") => image_path
                .map(|p| Self::Local { image_path: p.to_string() })
                .ok_or_else(|| TileidxError::poison("local tile_store requires image_path")),
            Some("strip") => match (raster_path, pixel_polygon) {
                (Some(r), Some(p)) => Ok(Self::RasterWindow {
                    raster_path: r.to_string(),
                    pixel_polygon: p.to_string(),
                }),
                _ => Err(TileidxError::poison(
                    "strip tile_store requires raster_path and pixel_polygon",
                )),
            },
            Some("synthetic") => Ok(Self::Synthetic),
            Some(other) => Err(TileidxError::poison(format!("unknown tile_store '{other}'"))),
            None => {
                if let Some(p) = image_path {
                    Ok(Self::Local { image_path: p.to_string() })
                } else if let (Some(r), Some(p)) = (raster_path, pixel_polygon) {
                    Ok(Self::RasterWindow {
                        raster_path: r.to_string(),
                        pixel_polygon: p.to_string(),
                    })
                } else {
                    Err(TileidxError::poison(
                        "tile has neither image_path nor (raster_path + pixel_polygon)",
                    ))
                }
            }
        }
    }
}

/// A tile registry row (spec §3). Optional columns default to `None` and
/// `status` defaults to `READY_FOR_INDEXING` when omitted, so a generator's
/// upsert payload only needs to send the fields its variant requires
/// (spec §4.1: "initial status defaults to READY_FOR_INDEXING unless given").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tile {
    pub tile_id: String,
    pub image_id: i64,
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
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub utm_zone: Option<String>,
    #[serde(default)]
    pub width: Option<i32>,
    #[serde(default)]
    pub height: Option<i32>,
    #[serde(default)]
    pub status: TileStatus,
    #[serde(default)]
    pub indexed_at: Option<i64>,
    #[serde(default)]
    pub embedder_backend: Option<String>,
    #[serde(default)]
    pub embedder_model: Option<String>,
}

impl Tile {
    /// Invariant 2: at least one of `image_path` or (`raster_path` + `pixel_polygon`).
    pub fn has_valid_source(&self) -> bool {
        self.image_path.is_some() || (self.raster_path.is_some() && self.pixel_polygon.is_some())
    }

    /// Invariant 4: `indexed_at` is set iff status is `INDEXED`.
    pub fn indexed_at_consistent(&self) -> bool {
        (self.status == TileStatus::Indexed) == self.indexed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        use TileStatus::*;
        assert!(ReadyForIndexing.validate_transition(InProcess).is_ok());
        assert!(InProcess.validate_transition(WaitingForEmbedding).is_ok());
        assert!(WaitingForEmbedding.validate_transition(WaitingForIndex).is_ok());
        assert!(WaitingForIndex.validate_transition(Indexed).is_ok());
        assert!(Indexed.validate_transition(ReadyForIndexing).is_ok());
    }

    #[test]
    fn any_nonterminal_can_fail() {
        use TileStatus::*;
        assert!(ReadyForIndexing.validate_transition(Failed).is_ok());
        assert!(InProcess.validate_transition(Failed).is_ok());
        assert!(WaitingForIndex.validate_transition(Failed).is_ok());
    }

    #[test]
    fn terminal_states_cannot_fail_again() {
        assert!(TileStatus::Failed.validate_transition(TileStatus::Failed).is_ok());
        assert!(TileStatus::Indexed.validate_transition(TileStatus::Failed).is_err());
    }

    #[test]
    fn repeating_current_status_is_idempotent() {
        assert!(TileStatus::InProcess.validate_transition(TileStatus::InProcess).is_ok());
    }

    #[test]
    fn off_dag_transition_is_invalid_state() {
        let err = TileStatus::ReadyForIndexing.validate_transition(TileStatus::Indexed);
        assert!(matches!(err, Err(TileidxError::InvalidState { .. })));
    }

    #[test]
    fn tile_source_picks_local_variant() {
        let src = TileSource::from_fields(None, Some("/x.png"), None, None).unwrap();
        assert!(matches!(src, TileSource::Local { .. }));
    }

    #[test]
    fn tile_source_picks_raster_window_variant() {
        let src = TileSource::from_fields(Some("strip"), None, Some("/r.tif"), Some("POLYGON((0 0,0 1,1 1,1 0,0 0))")).unwrap();
        assert!(matches!(src, TileSource::RasterWindow { .. }));
    }

    #[test]
    fn tile_source_rejects_missing_fields() {
        assert!(TileSource::from_fields(None, None, None, None).is_err());
    }

    #[test]
    fn deserializes_minimal_tile_with_defaults() {
        let raw = r#"{"tile_id":"orthophoto:0/0/0","image_id":1,"image_path":"/x.png"}"#;
        let tile: Tile = serde_json::from_str(raw).unwrap();
        assert_eq!(tile.status, TileStatus::ReadyForIndexing);
        assert_eq!(tile.indexed_at, None);
        assert_eq!(tile.embedder_backend, None);
        assert_eq!(tile.embedder_model, None);
        assert_eq!(tile.image_path.as_deref(), Some("/x.png"));
    }
}
