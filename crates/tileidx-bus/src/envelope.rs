//! Duck-typed ack/nack closures from the source adapters, modeled as a small
//! interface (spec §9 REDESIGN FLAGS): a bus implementation returns a
//! concrete `Acker`, upstream code only ever sees `MessageEnvelope`.

use async_trait::async_trait;
use tileidx_core::Result;

/// Acknowledgement half of an envelope. Implementations must treat acks
/// after the owning channel/connection has closed as no-ops, never errors
/// (spec §4.2: "Acks after channel close are no-ops (never raise)").
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<()>;
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// One delivered message: a JSON payload plus the means to settle it.
pub struct MessageEnvelope {
    pub payload: serde_json::Value,
    acker: Box<dyn Acker>,
}

impl MessageEnvelope {
    pub fn new(payload: serde_json::Value, acker: Box<dyn Acker>) -> Self {
        Self { payload, acker }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for MessageEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageEnvelope").field("payload", &self.payload).finish()
    }
}

/// Parse a comma-separated queue-name list, dropping empty entries, per the
/// multi-queue consume contract (spec §4.2, §6).
pub fn split_queue_names(queue: &str) -> Vec<String> {
    queue.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_drops_empty_entries() {
        assert_eq!(split_queue_names("a, b,,c "), vec!["a", "b", "c"]);
    }

    #[test]
    fn single_queue_passes_through() {
        assert_eq!(split_queue_names("q1"), vec!["q1"]);
    }
}
