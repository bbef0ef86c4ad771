pub mod config;
pub mod routing;
pub mod tick;

pub use config::SchedulerConfig;
pub use routing::{parse_embedder_queues, EmbedderQueues};
pub use tick::Scheduler;
