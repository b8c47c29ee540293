//! Stream Processor (§4.6): one instance per consumer worker, running the
//! full receive → idempotency-gate → rule-engine → state-update →
//! feature-extract → model-call → combine → publish → persist → ack
//! sequence for every inbound message.

use crate::config::Config;
use crate::domain::{is_schema_valid, Category, Decision, Transaction};
use crate::error::PipelineError;
use crate::features;
use crate::model::ModelClient;
use crate::rules::{self, StateSignals};
use crate::scoring;
use crate::sink::decision_store::DecisionStore;
use crate::sink::publisher;
use crate::state::StateStore;
use crate::stream::bus::{InboundMessage, MessagePublisher, MessageSource};
use chrono::Utc;
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

pub struct Worker {
    pub config: Arc<Config>,
    pub source: Arc<dyn MessageSource>,
    pub publisher: Arc<dyn MessagePublisher>,
    pub state_store: Arc<dyn StateStore>,
    pub model_client: Arc<dyn ModelClient>,
    pub decision_store: Arc<DecisionStore>,
}

impl Worker {
    /// Drain the inbound topic forever. Each iteration is one message; a
    /// transport-level receive error is logged and the loop retries rather
    /// than exiting, since a single worker's death would stall its
    /// partitions entirely.
    pub async fn run(&self) {
        loop {
            match self.source.receive().await {
                Ok(message) => {
                    if let Err(e) = self.process_one(message).await {
                        error!(error = %e, "failed to process message, will be redelivered");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "consumer receive failed");
                }
            }
        }
    }

    /// `pub` so integration tests can drive the full sequence directly
    /// against in-memory collaborators instead of duplicating its steps.
    pub async fn process_one(&self, message: InboundMessage) -> anyhow::Result<()> {
        let start = Instant::now();

        let raw: serde_json::Value = match serde_json::from_slice(&message.payload) {
            Ok(v) => v,
            Err(_) => {
                self.route_to_dlq(&message, PipelineError::SchemaInvalid.tag())
                    .await?;
                self.source.acknowledge(&message)?;
                return Ok(());
            }
        };

        if !is_schema_valid(&raw) {
            self.route_to_dlq(&message, PipelineError::SchemaInvalid.tag())
                .await?;
            self.source.acknowledge(&message)?;
            return Ok(());
        }

        let tx: Transaction = serde_json::from_value(raw)?;

        // Step 2: idempotency gate.
        if self.decision_store.exists(&tx.transaction_id)? {
            warn!(
                error = %PipelineError::DuplicateDecision(tx.transaction_id.clone()),
                "skipping duplicate transaction"
            );
            counter!("fraudguard_duplicate_transactions_total").increment(1);
            self.source.acknowledge(&message)?;
            return Ok(());
        }

        let now = tx.occurred_at.timestamp();
        let cfg = &self.config;

        // Step 3: read state signals, before any writes for this transaction.
        let recent_count = self
            .state_store
            .recent_count(&tx.user_id, now, cfg.rules.burst_window_sec)
            .await;
        let median_amount = self.state_store.median_amount(&tx.user_id).await;
        let device_first_seen = match tx.device_id() {
            Some(id) => self.state_store.device_first_seen(&tx.user_id, id).await,
            None => None,
        };
        let ip_first_seen = match tx.ip() {
            Some(ip) => self.state_store.ip_first_seen(&tx.user_id, ip).await,
            None => None,
        };
        let last_location = self.state_store.get_last_location(&tx.user_id).await;

        let signals = StateSignals {
            // `recent_count` only reflects transactions already recorded for
            // this user; the one being evaluated right now is itself part of
            // the window being measured (§4.2 burst: "exactly burstCount
            // transactions in the window fires"), so it's counted here too.
            recent_count_in_window: recent_count + 1,
            median_amount,
            device_is_new: tx
                .device_id()
                .is_some_and(|_| rules::is_within_freshness_window(device_first_seen, now, cfg.rules.device_new_within_days)),
            ip_is_new: tx
                .ip()
                .is_some_and(|_| rules::is_within_freshness_window(ip_first_seen, now, cfg.rules.ip_new_within_days)),
            last_location,
        };

        // Step 4: rule engine.
        let outcome = rules::evaluate(&tx, &signals, &cfg.rules);

        // Step 5: record state updates, strictly after step 3's reads.
        self.record_state_updates(&tx, now).await;

        // Step 6: feature vector + model call.
        let vector = features::extract(&tx, &signals, &outcome.bits, outcome.implied_speed_kmph);
        if vector.len() != cfg.ml.expected_feature_count {
            return Err(PipelineError::FeatureCountMismatch {
                extractor: vector.len(),
                model: cfg.ml.expected_feature_count,
            }
            .into());
        }
        let probability = self.model_client.predict(&vector).await;

        // Step 7: combine + classify.
        let mut reasons = outcome.reasons;
        let ml_weight = if cfg.ml.enabled { cfg.ml.weight } else { 0.0 };
        let final_score = scoring::combine(
            outcome.score,
            outcome.bits.invalid_amount,
            probability,
            ml_weight,
            &cfg.rules,
            &mut reasons,
        );
        let category = scoring::classify(final_score, &cfg.thresholds);

        let latency_ms = start.elapsed().as_millis() as u64;
        let decision = Decision::new(
            tx.transaction_id.clone(),
            tx.user_id.clone(),
            category,
            final_score,
            reasons,
            latency_ms,
            Utc::now(),
        );

        // Step 8: publish, step 9: persist. Either failing means the input
        // offset must not be acknowledged (§4.6).
        publisher::publish_with_retry(
            self.publisher.as_ref(),
            &self.config.kafka.outbound_topic,
            &decision,
            &self.config.sink,
        )
        .await?;
        publisher::persist_with_retry(&self.decision_store, &decision, &self.config.sink)?;

        // Step 10: acknowledge.
        self.source.acknowledge(&message)?;

        histogram!("fraudguard_decision_latency_ms").record(latency_ms as f64);
        counter!("fraudguard_decisions_total", "category" => category_label(category)).increment(1);

        info!(
            transaction_id = %decision.transaction_id,
            decision = %decision.decision,
            score = decision.score,
            latency_ms,
            "transaction scored"
        );

        Ok(())
    }

    async fn record_state_updates(&self, tx: &Transaction, now: i64) {
        self.state_store.record_tx_time(&tx.user_id, now).await;
        if let Some(amount) = tx.amount {
            self.state_store
                .record_amount(&tx.user_id, amount, self.config.rules.spend_history_size)
                .await;
        }
        if let Some(device_id) = tx.device_id() {
            self.state_store.observe_device(&tx.user_id, device_id, now).await;
        }
        if let Some(ip) = tx.ip() {
            self.state_store.observe_ip(&tx.user_id, ip, now).await;
        }
        if let Some(location) = tx.location.clone() {
            self.state_store
                .set_last_location(&tx.user_id, location.lat, location.lon, now)
                .await;
        }
    }

    async fn route_to_dlq(&self, message: &InboundMessage, reason: &str) -> anyhow::Result<()> {
        let key = message
            .key
            .as_ref()
            .map(|k| String::from_utf8_lossy(k).to_string())
            .unwrap_or_default();
        let envelope = serde_json::json!({
            "reason": reason,
            "payload": String::from_utf8_lossy(&message.payload),
        });
        counter!("fraudguard_dlq_total").increment(1);
        self.publisher
            .publish(
                &self.config.kafka.dlq_topic,
                &key,
                &serde_json::to_vec(&envelope)?,
            )
            .await
    }
}

fn category_label(category: Category) -> &'static str {
    match category {
        Category::Allow => "allow",
        Category::Review => "review",
        Category::Block => "block",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KafkaConfig, MlConfig, RulesConfig, SinkConfig, ThresholdsConfig};
    use crate::model::FakeModelClient;
    use crate::state::InMemoryStateStore;
    use crate::stream::bus::InMemoryBus;
    use tempfile::NamedTempFile;

    fn cfg() -> Config {
        Config {
            rules: RulesConfig {
                burst_window_sec: 60,
                burst_count: 3,
                burst_score: 40.0,
                geo_max_speed_kmph: 900.0,
                geo_score: 50.0,
                device_new_within_days: 7,
                ip_new_within_days: 7,
                spend_multiplier: 5.0,
                spend_history_size: 10,
                weight: 0.5,
            },
            ml: MlConfig {
                enabled: true,
                weight: 0.5,
                timeout_ms: 2000,
                endpoint: "http://127.0.0.1:1".into(),
                expected_feature_count: features::FEATURE_COUNT,
            },
            thresholds: ThresholdsConfig {
                review: 30.0,
                block: 60.0,
            },
            kafka: KafkaConfig {
                bootstrap_servers: "localhost:9092".into(),
                inbound_topic: "transactions".into(),
                outbound_topic: "fraud_decisions".into(),
                dlq_topic: "transactions.dlq".into(),
                consumer_group: "fraud-scoring".into(),
            },
            sink: SinkConfig {
                max_retries: 2,
                retry_backoff_ms: 1,
            },
            state_store_redis_url: "redis://localhost".into(),
            decision_store_path: "./unused.db".into(),
            admin_bind_addr: "0.0.0.0:9090".into(),
        }
    }

    fn worker(bus: Arc<InMemoryBus>, model_probability: f64, db_path: &str) -> Worker {
        Worker {
            config: Arc::new(cfg()),
            source: bus.clone(),
            publisher: bus,
            state_store: Arc::new(InMemoryStateStore::new()),
            model_client: Arc::new(FakeModelClient::new(model_probability)),
            decision_store: Arc::new(DecisionStore::open(db_path).unwrap()),
        }
    }

    #[tokio::test]
    async fn process_one_publishes_persists_and_acks_a_valid_transaction() {
        let bus = Arc::new(InMemoryBus::new());
        let file = NamedTempFile::new().unwrap();
        let worker = worker(bus.clone(), 0.0, file.path().to_str().unwrap());

        let payload = serde_json::json!({
            "transactionId": "t1",
            "userId": "u1",
            "amount": 25.0,
            "currency": "USD",
            "occurredAt": "2026-01-01T12:00:00Z",
        });
        let message = InboundMessage::new_for_test(serde_json::to_vec(&payload).unwrap(), None);

        worker.process_one(message).await.unwrap();

        assert_eq!(bus.acked_count(), 1);
        assert_eq!(bus.published().len(), 1);
        assert!(worker.decision_store.exists("t1").unwrap());
    }

    #[tokio::test]
    async fn process_one_routes_malformed_schema_to_dlq_and_acks() {
        let bus = Arc::new(InMemoryBus::new());
        let file = NamedTempFile::new().unwrap();
        let worker = worker(bus.clone(), 0.0, file.path().to_str().unwrap());

        let payload = serde_json::json!({"amount": 10.0});
        let message = InboundMessage::new_for_test(serde_json::to_vec(&payload).unwrap(), None);

        worker.process_one(message).await.unwrap();

        assert_eq!(bus.acked_count(), 1);
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "transactions.dlq");
        let envelope: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(envelope["reason"], "schema_invalid");
    }

    #[tokio::test]
    async fn process_one_skips_a_transaction_id_already_decided() {
        let bus = Arc::new(InMemoryBus::new());
        let file = NamedTempFile::new().unwrap();
        let worker = worker(bus.clone(), 0.0, file.path().to_str().unwrap());

        let payload = serde_json::json!({
            "transactionId": "dup1",
            "userId": "u1",
            "amount": 25.0,
            "currency": "USD",
            "occurredAt": "2026-01-01T12:00:00Z",
        });

        worker
            .process_one(InboundMessage::new_for_test(
                serde_json::to_vec(&payload).unwrap(),
                None,
            ))
            .await
            .unwrap();
        worker
            .process_one(InboundMessage::new_for_test(
                serde_json::to_vec(&payload).unwrap(),
                None,
            ))
            .await
            .unwrap();

        // One decision published for the first delivery; the second is
        // acked without a second publish.
        assert_eq!(bus.acked_count(), 2);
        assert_eq!(bus.published().len(), 1);
    }
}
