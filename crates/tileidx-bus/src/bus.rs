//! Bus-agnostic trait surface (spec §4.2).

use async_trait::async_trait;
use tileidx_core::Result;

use crate::envelope::MessageEnvelope;

/// Consumer driving style. Both expose the same `Consumer` interface so
/// upstream code (the scheduler, the worker) is style-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeStyle {
    /// The broker drives delivery; messages are buffered internally by a
    /// background task and drained one at a time.
    Callback,
    /// The consumer drives every fetch; yields `None` on idleness instead of
    /// blocking, so a coordination loop can interleave other work.
    Polling,
}

/// A durable named-queue message bus with at-least-once delivery.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a JSON payload to `queue`. Must survive broker restart.
    async fn publish(&self, queue: &str, payload: &serde_json::Value) -> Result<()>;

    /// Open a consumer over a (possibly comma-separated) queue name.
    /// `prefetch` bounds the number of unacked messages outstanding.
    async fn consumer(
        &self,
        queue: &str,
        prefetch: u32,
        style: ConsumeStyle,
    ) -> Result<Box<dyn Consumer>>;
}

/// A live consumer. `poll_next` yields `None` when no message is currently
/// available (idle tick); it never blocks indefinitely, so a coordination
/// loop can combine it with a flush timer.
#[async_trait]
pub trait Consumer: Send {
    async fn poll_next(&mut self) -> Result<Option<MessageEnvelope>>;
}
