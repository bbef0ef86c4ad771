pub mod config;
pub mod http;
pub mod store;

pub use config::RegistryConfig;
pub use http::{router, AppState};
pub use store::TileRegistry;
