pub mod catalog;
pub mod clients;
pub mod embedding;
pub mod error;
pub mod geometry;
pub mod identity;
pub mod message;
pub mod tile;

pub use clients::{RegistryClient, VectorClient};
pub use embedding::{embed_seed, EMBEDDING_DIM};
pub use error::{Result, TileidxError};
pub use geometry::haversine_m;
pub use identity::{canonical_tile_id, tile_id_hash, TileKey};
pub use message::IndexRequest;
pub use tile::{Tile, TileSource, TileStatus};
