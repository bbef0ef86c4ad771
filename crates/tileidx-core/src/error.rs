//! Error taxonomy shared across the indexing fabric (see spec §7).

use thiserror::Error;

/// Result type alias used throughout the tileidx crates.
pub type Result<T> = std::result::Result<T, TileidxError>;

/// Core error kinds. Each variant maps to one of the propagation policies in
/// §7: transient errors are retried by the caller, poison/resource-exhaustion
/// errors terminate the tile (mark FAILED, ack), schema conflicts are fatal
/// at startup, and invalid-state transitions are surfaced, never retried.
#[derive(Error, Debug)]
pub enum TileidxError {
    #[error("transient I/O failure during {operation}: {reason}")]
    Transient { operation: String, reason: String },

    #[error("poison payload rejected: {reason}")]
    Poison { reason: String },

    #[error("resource exhausted: {resource}, limit: {limit}")]
    ResourceExhausted { resource: String, limit: String },

    #[error("schema conflict on table '{table}': expected dim {expected}, found {found}")]
    SchemaConflict {
        table: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid state transition on tile '{tile_id}': {from:?} -> {to:?}")]
    InvalidState {
        tile_id: String,
        from: String,
        to: String,
    },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimMismatch { expected: usize, got: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TileidxError {
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn poison(reason: impl Into<String>) -> Self {
        Self::Poison {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(
        tile_id: impl Into<String>,
        from: impl std::fmt::Debug,
        to: impl std::fmt::Debug,
    ) -> Self {
        Self::InvalidState {
            tile_id: tile_id.into(),
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }

    /// A short machine-readable discriminant, used as `error_kind` on HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transient { .. } => "transient",
            Self::Poison { .. } => "poison",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::SchemaConflict { .. } => "schema_conflict",
            Self::InvalidState { .. } => "invalid_state",
            Self::NotFound { .. } => "not_found",
            Self::DimMismatch { .. } => "dim_mismatch",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for TileidxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for TileidxError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
