//! JetStream-backed `MessageBus`. Grounded on the connect/stream/publish
//! shape of the teacher's NATS bridge, generalized from a fixed set of
//! command/result subjects to arbitrary named embedding queues.

use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull, AckKind};
use async_trait::async_trait;
use tileidx_core::{Result, TileidxError};
use tokio::sync::{mpsc, Mutex};

use crate::bus::{ConsumeStyle, Consumer, MessageBus};
use crate::envelope::{split_queue_names, Acker, MessageEnvelope};

#[derive(Debug, Clone)]
pub struct NatsBusConfig {
    pub url: String,
    /// JetStream stream backing all queues; queues are subjects
    /// `{subject_prefix}.{queue}` within it.
    pub stream_name: String,
    pub subject_prefix: String,
    pub ack_wait: Duration,
}

impl Default for NatsBusConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream_name: "TILEIDX_QUEUES".to_string(),
            subject_prefix: "tileidx.queue".to_string(),
            ack_wait: Duration::from_secs(30),
        }
    }
}

pub struct NatsBus {
    config: NatsBusConfig,
    jetstream: jetstream::Context,
}

impl NatsBus {
    pub async fn connect(config: NatsBusConfig) -> Result<Self> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| TileidxError::transient("nats connect", e.to_string()))?;
        let jetstream = jetstream::new(client);

        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: config.stream_name.clone(),
                subjects: vec![format!("{}.>", config.subject_prefix)],
                ..Default::default()
            })
            .await
            .map_err(|e| TileidxError::transient("nats stream init", e.to_string()))?;

        tracing::info!(stream = %config.stream_name, "jetstream queue stream ready");
        Ok(Self { config, jetstream })
    }

    fn subject(&self, queue: &str) -> String {
        format!("{}.{}", self.config.subject_prefix, queue)
    }

    async fn pull_consumer(&self, queue: &str, prefetch: u32) -> Result<pull::Stream> {
        let subject = self.subject(queue);
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| TileidxError::transient("nats get stream", e.to_string()))?;

        let consumer_name = format!("tileidx-{}", queue.replace(['.', ':'], "_"));
        let consumer = stream
            .get_or_create_consumer(
                &consumer_name,
                pull::Config {
                    durable_name: Some(consumer_name.clone()),
                    filter_subject: subject,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    max_ack_pending: prefetch.max(1) as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TileidxError::transient("nats get_or_create_consumer", e.to_string()))?;

        consumer
            .messages()
            .await
            .map_err(|e| TileidxError::transient("nats consumer.messages", e.to_string()))
    }
}

#[async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, queue: &str, payload: &serde_json::Value) -> Result<()> {
        let subject = self.subject(queue);
        let bytes = serde_json::to_vec(payload)?;
        self.jetstream
            .publish(subject, bytes.into())
            .await
            .map_err(|e| TileidxError::transient("nats publish", e.to_string()))?
            .await
            .map_err(|e| TileidxError::transient("nats publish ack", e.to_string()))?;
        Ok(())
    }

    async fn consumer(
        &self,
        queue: &str,
        prefetch: u32,
        style: ConsumeStyle,
    ) -> Result<Box<dyn Consumer>> {
        let names = split_queue_names(queue);
        if names.is_empty() {
            return Err(TileidxError::poison("no queue names provided to consume()"));
        }

        let mut streams = Vec::with_capacity(names.len());
        for name in &names {
            streams.push(self.pull_consumer(name, prefetch).await?);
        }

        match style {
            ConsumeStyle::Polling => Ok(Box::new(PollingConsumer { streams, next: 0 })),
            ConsumeStyle::Callback => Ok(Box::new(CallbackConsumer::spawn(streams, prefetch))),
        }
    }
}

struct NatsAcker {
    message: Arc<Mutex<Option<jetstream::Message>>>,
}

#[async_trait]
impl Acker for NatsAcker {
    async fn ack(&self) -> Result<()> {
        if let Some(msg) = self.message.lock().await.take() {
            if let Err(e) = msg.ack().await {
                tracing::debug!(error = %e, "ack after channel close ignored");
            }
        }
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        if let Some(msg) = self.message.lock().await.take() {
            let kind = if requeue { AckKind::Nak(None) } else { AckKind::Term };
            if let Err(e) = msg.ack_with(kind).await {
                tracing::debug!(error = %e, "nack after channel close ignored");
            }
        }
        Ok(())
    }
}

fn envelope_from_message(message: jetstream::Message) -> Result<MessageEnvelope> {
    let payload: serde_json::Value = serde_json::from_slice(&message.payload)?;
    let acker = NatsAcker { message: Arc::new(Mutex::new(Some(message))) };
    Ok(MessageEnvelope::new(payload, Box::new(acker)))
}

/// Polling style: the coordination loop drives every fetch and gets `None`
/// back instead of blocking when a queue is empty (mirrors `basic_get`
/// round-robin over multiple queues in the source adapter).
struct PollingConsumer {
    streams: Vec<pull::Stream>,
    next: usize,
}

#[async_trait]
impl Consumer for PollingConsumer {
    async fn poll_next(&mut self) -> Result<Option<MessageEnvelope>> {
        use futures::StreamExt;

        let n = self.streams.len();
        for offset in 0..n {
            let idx = (self.next + offset) % n;
            let fetch = tokio::time::timeout(Duration::from_millis(50), self.streams[idx].next()).await;
            if let Ok(Some(Ok(message))) = fetch {
                self.next = (idx + 1) % n;
                return Ok(Some(envelope_from_message(message)?));
            }
        }
        Ok(None)
    }
}

/// Callback style: a background task per queue drains the broker-driven
/// stream into a shared channel; `poll_next` never blocks on broker IO.
struct CallbackConsumer {
    rx: mpsc::Receiver<jetstream::Message>,
}

impl CallbackConsumer {
    fn spawn(streams: Vec<pull::Stream>, prefetch: u32) -> Self {
        let capacity = prefetch.max(1) as usize;
        let (tx, rx) = mpsc::channel(capacity);
        for mut stream in streams {
            let tx = tx.clone();
            tokio::spawn(async move {
                use futures::StreamExt;
                while let Some(next) = stream.next().await {
                    match next {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "jetstream delivery error");
                        }
                    }
                }
            });
        }
        Self { rx }
    }
}

#[async_trait]
impl Consumer for CallbackConsumer {
    async fn poll_next(&mut self) -> Result<Option<MessageEnvelope>> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(envelope_from_message(message)?)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Ok(None),
        }
    }
}
