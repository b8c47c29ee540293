//! Event bus transport (§6.1, §6.2): `MessageSource`/`MessagePublisher` are
//! the seams `Worker` is built against, mirroring the `StateStore`/
//! `ModelClient` pattern elsewhere — one `KafkaConsumer`/`KafkaProducer` per
//! worker in production, an `InMemoryBus` in tests. Manual offset commit
//! means a message is only acknowledged after its decision has been
//! published and persisted (§4.6 steps 8–10).

use crate::config::KafkaConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A single consumed message, detached from the borrow of the underlying
/// consumer so it can be handed off across `.await` points freely. `kafka`
/// carries the handle `KafkaConsumer::acknowledge` needs to commit the
/// offset; fake sources never populate it since they track acks themselves.
pub struct InboundMessage {
    pub payload: Vec<u8>,
    pub key: Option<Vec<u8>>,
    kafka: Option<OwnedMessage>,
}

impl InboundMessage {
    /// Build a message with no Kafka handle attached, for driving
    /// `Worker::process_one` directly in tests.
    pub fn new_for_test(payload: Vec<u8>, key: Option<Vec<u8>>) -> Self {
        Self {
            payload,
            key,
            kafka: None,
        }
    }
}

/// Where a worker's inbound messages come from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn receive(&self) -> Result<InboundMessage>;
    fn acknowledge(&self, message: &InboundMessage) -> Result<()>;
}

/// Where a worker's outbound decisions (and DLQ records) go.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()>;
}

/// rdkafka-backed `MessageSource`: one `StreamConsumer` per worker.
pub struct KafkaConsumer(StreamConsumer);

impl KafkaConsumer {
    pub fn build(cfg: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap_servers)
            .set("group.id", &cfg.consumer_group)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .create()
            .context("failed to create Kafka consumer")?;

        consumer
            .subscribe(&[cfg.inbound_topic.as_str()])
            .with_context(|| format!("failed to subscribe to {}", cfg.inbound_topic))?;

        Ok(Self(consumer))
    }
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    /// Block until the next message arrives, releasing the worker's
    /// execution context while waiting (§5 suspension points).
    async fn receive(&self) -> Result<InboundMessage> {
        let borrowed = self.0.recv().await.context("consumer receive failed")?;
        let inner = borrowed.detach();
        Ok(InboundMessage {
            payload: inner.payload().unwrap_or_default().to_vec(),
            key: inner.key().map(|k| k.to_vec()),
            kafka: Some(inner),
        })
    }

    /// Commit the offset for a message that has been fully processed
    /// (published + persisted). Never called on a failure path —
    /// redelivery is how the pipeline recovers from sink failures (§4.6).
    fn acknowledge(&self, message: &InboundMessage) -> Result<()> {
        let inner = message
            .kafka
            .as_ref()
            .context("message has no Kafka handle to acknowledge")?;
        self.0
            .commit_message(inner, CommitMode::Async)
            .context("failed to commit offset")
    }
}

/// rdkafka-backed `MessagePublisher`: one `FutureProducer` per worker, used
/// for both the outbound decision topic and the DLQ topic.
pub struct KafkaProducer(FutureProducer);

impl KafkaProducer {
    pub fn build(cfg: &KafkaConfig) -> Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()
            .context("failed to create Kafka producer")?;
        Ok(Self(producer))
    }
}

#[async_trait]
impl MessagePublisher for KafkaProducer {
    /// Publish a decision (or a DLQ record) to `topic`, keyed by `key` so
    /// per-user ordering on the outbound topic matches the inbound
    /// partitioning (§5 ordering guarantees).
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.0
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| e)
            .context("failed to publish message")?;
        Ok(())
    }
}

/// Something an `InMemoryBus` published, kept around for test assertions.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Plain in-memory stand-in for both ends of the bus, so
/// `Worker::process_one` can be driven end-to-end in tests without a live
/// Kafka cluster. Never fails.
#[derive(Default)]
pub struct InMemoryBus {
    inbound: Mutex<VecDeque<InboundMessage>>,
    published: Mutex<Vec<PublishedMessage>>,
    acked: Mutex<u32>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw payload as if it had just arrived off the inbound topic.
    pub fn push(&self, payload: Vec<u8>) {
        self.inbound
            .lock()
            .unwrap()
            .push_back(InboundMessage::new_for_test(payload, None));
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn acked_count(&self) -> u32 {
        *self.acked.lock().unwrap()
    }
}

#[async_trait]
impl MessageSource for InMemoryBus {
    async fn receive(&self) -> Result<InboundMessage> {
        self.inbound
            .lock()
            .unwrap()
            .pop_front()
            .context("no message available")
    }

    fn acknowledge(&self, _message: &InboundMessage) -> Result<()> {
        *self.acked.lock().unwrap() += 1;
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBus {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<()> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_bus_roundtrips_push_and_receive() {
        let bus = InMemoryBus::new();
        bus.push(b"hello".to_vec());
        let message = bus.receive().await.unwrap();
        assert_eq!(message.payload, b"hello");
        bus.acknowledge(&message).unwrap();
        assert_eq!(bus.acked_count(), 1);
    }

    #[tokio::test]
    async fn in_memory_bus_records_published_messages() {
        let bus = InMemoryBus::new();
        bus.publish("topic", "key1", b"payload").await.unwrap();
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "topic");
        assert_eq!(published[0].key, "key1");
    }

    #[tokio::test]
    async fn receive_on_empty_queue_errs() {
        let bus = InMemoryBus::new();
        assert!(bus.receive().await.is_err());
    }
}
