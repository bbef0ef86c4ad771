pub mod config;
pub mod http;
pub mod nms;

pub use config::RetrieverConfig;
pub use http::{router, AppState};
pub use nms::{suppress, RankedPoint};
