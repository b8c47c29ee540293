//! Config Surface (§6.5). A single immutable snapshot loaded once from the
//! environment at startup and handed out as `Arc<Config>`; hot-reload is out
//! of scope (§9).

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RulesConfig {
    pub burst_window_sec: i64,
    pub burst_count: u32,
    pub burst_score: f64,
    pub geo_max_speed_kmph: f64,
    pub geo_score: f64,
    pub device_new_within_days: i64,
    pub ip_new_within_days: i64,
    pub spend_multiplier: f64,
    pub spend_history_size: usize,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct MlConfig {
    pub enabled: bool,
    pub weight: f64,
    pub timeout_ms: u64,
    pub endpoint: String,
    pub expected_feature_count: usize,
}

impl MlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdsConfig {
    pub review: f64,
    pub block: f64,
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub inbound_topic: String,
    pub outbound_topic: String,
    pub dlq_topic: String,
    pub consumer_group: String,
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl SinkConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Top-level, validated configuration snapshot.
#[derive(Debug, Clone)]
pub struct Config {
    pub rules: RulesConfig,
    pub ml: MlConfig,
    pub thresholds: ThresholdsConfig,
    pub kafka: KafkaConfig,
    pub sink: SinkConfig,
    pub state_store_redis_url: String,
    pub decision_store_path: String,
    pub admin_bind_addr: String,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {name}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load from environment (with `.env` support), then validate.
    /// Per §7, an invalid configuration is fatal: the process must refuse to
    /// start rather than run with a nonsensical snapshot.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Config {
            rules: RulesConfig {
                burst_window_sec: env_parse("RULES_BURST_WINDOW_SEC", 60)?,
                burst_count: env_parse("RULES_BURST_COUNT", 3)?,
                burst_score: env_parse("RULES_BURST_SCORE", 40.0)?,
                geo_max_speed_kmph: env_parse("RULES_GEO_MAX_SPEED_KMPH", 900.0)?,
                geo_score: env_parse("RULES_GEO_SCORE", 50.0)?,
                device_new_within_days: env_parse("RULES_DEVICE_NEW_WITHIN_DAYS", 7)?,
                ip_new_within_days: env_parse("RULES_IP_NEW_WITHIN_DAYS", 7)?,
                spend_multiplier: env_parse("RULES_SPEND_MULTIPLIER", 5.0)?,
                spend_history_size: env_parse("RULES_SPEND_HISTORY_SIZE", 10usize)?,
                weight: env_parse("RULES_WEIGHT", 0.5)?,
            },
            ml: MlConfig {
                enabled: env_parse("ML_ENABLED", true)?,
                weight: env_parse("ML_WEIGHT", 0.5)?,
                timeout_ms: env_parse("ML_TIMEOUT_MS", 2000u64)?,
                endpoint: env_or("MODEL_ENDPOINT", "http://127.0.0.1:8090"),
                expected_feature_count: env_parse("MODEL_EXPECTED_FEATURE_COUNT", 18usize)?,
            },
            thresholds: ThresholdsConfig {
                review: env_parse("THRESHOLDS_REVIEW", 30.0)?,
                block: env_parse("THRESHOLDS_BLOCK", 60.0)?,
            },
            kafka: KafkaConfig {
                bootstrap_servers: env_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092"),
                inbound_topic: env_or("KAFKA_INBOUND_TOPIC", "transactions"),
                outbound_topic: env_or("KAFKA_OUTBOUND_TOPIC", "fraud_decisions"),
                dlq_topic: env_or("KAFKA_DLQ_TOPIC", "transactions.dlq"),
                consumer_group: env_or("KAFKA_CONSUMER_GROUP", "fraud-scoring"),
            },
            sink: SinkConfig {
                max_retries: env_parse("SINK_MAX_RETRIES", 3)?,
                retry_backoff_ms: env_parse("SINK_RETRY_BACKOFF_MS", 100u64)?,
            },
            state_store_redis_url: env_or("STATE_STORE_REDIS_URL", "redis://127.0.0.1:6379"),
            decision_store_path: env_or("DECISION_STORE_PATH", "./fraud_decisions.db"),
            admin_bind_addr: env_or("ADMIN_BIND_ADDR", "0.0.0.0:9090"),
        };

        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.rules.weight >= 0.0 && self.ml.weight >= 0.0,
            "rules.weight and ml.weight must be non-negative"
        );
        anyhow::ensure!(
            self.thresholds.review < self.thresholds.block,
            "thresholds.review must be strictly less than thresholds.block"
        );
        anyhow::ensure!(
            self.rules.burst_count > 0,
            "rules.burst.count must be positive"
        );
        anyhow::ensure!(
            self.rules.spend_history_size > 0,
            "rules.spend.historySize must be positive"
        );
        anyhow::ensure!(
            self.ml.expected_feature_count > 0,
            "ml.expected_feature_count must be positive"
        );
        anyhow::ensure!(
            self.rules.burst_window_sec == 60,
            "rules.burst.windowSec must be 60: the burst_60s reason tag and the \
             recent_count_60s feature slot are both fixed to a 60-second window"
        );
        Ok(())
    }
}
