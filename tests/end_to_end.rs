//! End-to-end scenarios (§8): drives `Worker::process_one` directly — the
//! real receive → idempotency-gate → rule-engine → state-update →
//! feature-extract → model-call → combine → publish → persist → ack
//! sequence — against an `InMemoryBus`, `InMemoryStateStore`,
//! `FakeModelClient`, and a tempfile-backed `DecisionStore`, so nothing here
//! re-derives the processor's logic by hand. Model probabilities below are
//! chosen to land in the documented score bands together with the rule
//! contribution alone (default `rules.weight` / `ml.weight` = 0.5/0.5); they
//! stand in for "the model agrees with the rules," which is what the
//! scenario table assumes of a live model.

use chrono::{DateTime, TimeZone, Utc};
use fraudguard_backend::config::{Config, KafkaConfig, MlConfig, RulesConfig, SinkConfig, ThresholdsConfig};
use fraudguard_backend::domain::{Category, Decision, Device, Location, ReasonTag};
use fraudguard_backend::features;
use fraudguard_backend::model::FakeModelClient;
use fraudguard_backend::sink::DecisionStore;
use fraudguard_backend::state::InMemoryStateStore;
use fraudguard_backend::stream::bus::{InMemoryBus, InboundMessage};
use fraudguard_backend::stream::Worker;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn config() -> Config {
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

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap()
}

/// One worker per test, wired to a fresh in-memory bus/state store and a
/// fresh tempfile-backed decision store, with the model fixed to
/// `probability` for every call.
struct Harness {
    worker: Worker,
    bus: Arc<InMemoryBus>,
    _db: NamedTempFile,
}

fn harness(probability: f64) -> Harness {
    let bus = Arc::new(InMemoryBus::new());
    let db = NamedTempFile::new().unwrap();
    let worker = Worker {
        config: Arc::new(config()),
        source: bus.clone(),
        publisher: bus.clone(),
        state_store: Arc::new(InMemoryStateStore::new()),
        model_client: Arc::new(FakeModelClient::new(probability)),
        decision_store: Arc::new(DecisionStore::open(db.path().to_str().unwrap()).unwrap()),
    };
    Harness {
        worker,
        bus,
        _db: db,
    }
}

/// JSON payload for a transaction, in the wire shape the schema gate expects.
fn payload(
    transaction_id: &str,
    user_id: &str,
    amount: Option<f64>,
    occurred_at: DateTime<Utc>,
    device: Option<&Device>,
    location: Option<&Location>,
) -> Vec<u8> {
    let mut body = serde_json::json!({
        "transactionId": transaction_id,
        "userId": user_id,
        "amount": amount,
        "currency": "USD",
        "occurredAt": occurred_at.to_rfc3339(),
    });
    if let Some(d) = device {
        body["device"] = serde_json::to_value(d).unwrap();
    }
    if let Some(l) = location {
        body["location"] = serde_json::to_value(l).unwrap();
    }
    serde_json::to_vec(&body).unwrap()
}

/// Drives one transaction through `process_one` and returns the decision
/// that was published to the outbound topic.
async fn run_one(h: &Harness, transaction_id: &str, bytes: Vec<u8>) -> Decision {
    h.worker
        .process_one(InboundMessage::new_for_test(bytes, None))
        .await
        .unwrap();
    let published = h.bus.published();
    let record = published
        .iter()
        .rev()
        .find(|m| m.topic == "fraud_decisions")
        .unwrap_or_else(|| panic!("no decision published for {transaction_id}"));
    serde_json::from_slice(&record.payload).unwrap()
}

#[tokio::test]
async fn scenario_1_normal_daytime_transaction_allows() {
    let h = harness(0.0);
    let bytes = payload("t1", "u1", Some(120.0), at(12), None, None);
    let decision = run_one(&h, "t1", bytes).await;

    assert_eq!(decision.decision, Category::Allow);
    assert!(decision.score <= 15.0, "expected 0-15, got {}", decision.score);
    assert!(decision.reasons.is_empty());
    assert!(h.worker.decision_store.exists("t1").unwrap());
    assert_eq!(h.bus.acked_count(), 1);
}

#[tokio::test]
async fn scenario_2_night_time_elevated_amount_reviews() {
    let h = harness(0.5);
    let bytes = payload("t1", "u1", Some(800.0), at(2), None, None);
    let decision = run_one(&h, "t1", bytes).await;

    assert_eq!(decision.decision, Category::Review);
    assert!((30.0..=40.0).contains(&decision.score), "expected ~35, got {}", decision.score);
    assert!(decision.reasons.contains(&ReasonTag::NightTime.to_string()));
}

#[tokio::test]
async fn scenario_3_very_high_amount_blocks() {
    let h = harness(0.8);
    let bytes = payload("t1", "u2", Some(5000.0), at(12), None, None);
    let decision = run_one(&h, "t1", bytes).await;

    assert_eq!(decision.decision, Category::Block);
    assert!(decision.score >= 60.0);
    assert!(decision.reasons.contains(&ReasonTag::HighAmount.to_string()));
}

#[tokio::test]
async fn scenario_4_burst_blocks_on_third_transaction() {
    let h = harness(0.9);
    let base = at(12);

    let d1 = run_one(
        &h,
        "t1",
        payload("t1", "u3", Some(50.0), base, None, None),
    )
    .await;
    let d2 = run_one(
        &h,
        "t2",
        payload("t2", "u3", Some(50.0), base + chrono::Duration::seconds(4), None, None),
    )
    .await;
    assert_ne!(d1.decision, Category::Block);
    assert_ne!(d2.decision, Category::Block);

    let d3 = run_one(
        &h,
        "t3",
        payload("t3", "u3", Some(50.0), base + chrono::Duration::seconds(9), None, None),
    )
    .await;
    assert_eq!(d3.decision, Category::Block);
    assert!(d3.score >= 40.0, "expected >= 40 on 3rd, got {}", d3.score);
    assert!(d3.reasons.contains(&ReasonTag::Burst60s.to_string()));
}

#[tokio::test]
async fn scenario_5_new_device_and_ip_reviews_or_blocks() {
    let h = harness(0.6);
    let device = Device {
        id: "device-1".to_string(),
        ip: Some("203.0.113.7".to_string()),
        user_agent: None,
    };
    let bytes = payload("t1", "u4", Some(90.0), at(12), Some(&device), None);
    let decision = run_one(&h, "t1", bytes).await;

    assert!(decision.decision == Category::Review || decision.decision == Category::Block);
    assert!((35.0..=55.0).contains(&decision.score), "expected 35-55, got {}", decision.score);
    assert!(decision.reasons.contains(&ReasonTag::NewDevice.to_string()));
    assert!(decision.reasons.contains(&ReasonTag::NewIp.to_string()));
}

#[tokio::test]
async fn scenario_6_geo_impossible_blocks_on_second_transaction() {
    let h = harness(0.8);
    let base = at(12);

    let nyc = Location {
        lat: 40.71,
        lon: -74.01,
        city: None,
        country: None,
    };
    let tokyo = Location {
        lat: 35.68,
        lon: 139.65,
        city: None,
        country: None,
    };

    let d1 = run_one(
        &h,
        "t1",
        payload("t1", "u5", Some(50.0), base, None, Some(&nyc)),
    )
    .await;
    assert_ne!(d1.decision, Category::Block);

    let d2 = run_one(
        &h,
        "t2",
        payload("t2", "u5", Some(50.0), base + chrono::Duration::seconds(300), None, Some(&tokyo)),
    )
    .await;
    assert_eq!(d2.decision, Category::Block);
    assert!(d2.score >= 50.0, "expected >= 50, got {}", d2.score);
    assert!(d2.reasons.contains(&ReasonTag::GeoImpossible.to_string()));
}
