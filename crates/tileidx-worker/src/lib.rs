pub mod config;
pub mod embedder;
pub mod worker;

pub use config::WorkerConfig;
pub use embedder::{embed_batch, embed_one, TileImage, EMBEDDING_DIM};
pub use worker::Worker;
