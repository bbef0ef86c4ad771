pub mod adapter;
pub mod config;
pub mod http;
pub mod rows;
pub mod schema;

pub use adapter::{TableInfo, VectorIndexAdapter};
pub use config::VectorConfig;
pub use http::{router, AppState};
pub use schema::VectorDType;
