//! State Store Client (§4.1): typed operations over the warm per-user store.
//!
//! Backed by Redis (sorted sets for the tx-time series, a list for amount
//! history, hashes for first-seen maps, a string for last location) behind
//! the `StateStore` trait, so the rule engine and stream processor never see
//! the transport. Every read degrades to an absent/zero value on transport
//! failure; every write is best-effort and logged, never retried inline —
//! the next transaction for that user re-establishes state regardless.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

const TX_TIME_TTL_SECS: i64 = 2 * 24 * 3600;
const AMOUNT_TTL_SECS: i64 = 90 * 24 * 3600;
const FIRST_SEEN_TTL_SECS: i64 = 90 * 24 * 3600;
const LOCATION_TTL_SECS: i64 = 30 * 24 * 3600;
const TX_TIME_WINDOW_SECS: i64 = 24 * 3600;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn record_tx_time(&self, user_id: &str, ts: i64);
    async fn recent_count(&self, user_id: &str, now: i64, window_sec: i64) -> u32;
    async fn record_amount(&self, user_id: &str, amount: f64, max_size: usize);
    async fn median_amount(&self, user_id: &str) -> f64;
    async fn observe_device(&self, user_id: &str, device_id: &str, ts: i64) -> bool;
    /// Read-only: the device's first-seen epoch seconds, or `None` if this
    /// would be the first observation. Used by the rule engine *before* the
    /// corresponding `observe_device` write happens (§4.6 step 3 vs step 5).
    async fn device_first_seen(&self, user_id: &str, device_id: &str) -> Option<i64>;
    async fn observe_ip(&self, user_id: &str, ip: &str, ts: i64) -> bool;
    async fn ip_first_seen(&self, user_id: &str, ip: &str) -> Option<i64>;
    async fn get_last_location(&self, user_id: &str) -> Option<(f64, f64, i64)>;
    async fn set_last_location(&self, user_id: &str, lat: f64, lon: f64, ts: i64);
}

/// Median of a best-effort-parsed amount history. Garbage entries parse to
/// `0.0` rather than failing the whole computation (§4.1).
pub fn median_of(mut amounts: Vec<f64>) -> f64 {
    if amounts.is_empty() {
        return 0.0;
    }
    amounts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = amounts.len();
    if n % 2 == 1 {
        amounts[n / 2]
    } else {
        (amounts[n / 2 - 1] + amounts[n / 2]) / 2.0
    }
}

fn tx_times_key(user_id: &str) -> String {
    format!("user:{user_id}:tx_times")
}
fn amounts_key(user_id: &str) -> String {
    format!("user:{user_id}:amounts")
}
fn devices_key(user_id: &str) -> String {
    format!("user:{user_id}:devices")
}
fn ips_key(user_id: &str) -> String {
    format!("user:{user_id}:ips")
}
fn location_key(user_id: &str) -> String {
    format!("user:{user_id}:location")
}

/// Redis-backed implementation of the warm state store.
pub struct RedisStateStore {
    conn: ConnectionManager,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    async fn first_seen(&self, key: String, field: &str) -> Option<i64> {
        let mut conn = self.conn.clone();
        let first_seen: redis::RedisResult<Option<i64>> = conn.hget(&key, field).await;
        match first_seen {
            Ok(ts) => ts,
            Err(e) => {
                warn!(error = %e, %key, "state store read failed, degrading to absent");
                None
            }
        }
    }

    async fn observe(&self, key: String, field: &str, ts: i64, ttl: i64) -> bool {
        let mut conn = self.conn.clone();
        // HSETNX only writes if the field is absent, so an existing
        // first-seen timestamp is never overwritten.
        let newly_set: redis::RedisResult<bool> = conn.hset_nx(&key, field, ts).await;
        let _: redis::RedisResult<()> = conn.expire(&key, ttl).await;
        match newly_set {
            Ok(is_new) => is_new,
            Err(e) => {
                warn!(error = %e, %key, "state store write failed, treating as not first-seen");
                false
            }
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn record_tx_time(&self, user_id: &str, ts: i64) {
        let key = tx_times_key(user_id);
        let mut conn = self.conn.clone();
        let member = format!("{ts}-{}", Uuid::new_v4());
        let result: redis::RedisResult<()> = async {
            conn.zadd(&key, member, ts).await?;
            let cutoff = ts - TX_TIME_WINDOW_SECS;
            conn.zrembyscore(&key, i64::MIN, cutoff).await?;
            conn.expire(&key, TX_TIME_TTL_SECS).await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, %key, "failed to record tx time");
        }
    }

    async fn recent_count(&self, user_id: &str, now: i64, window_sec: i64) -> u32 {
        let key = tx_times_key(user_id);
        let mut conn = self.conn.clone();
        let count: redis::RedisResult<u32> =
            conn.zcount(&key, now - window_sec, now).await;
        count.unwrap_or_else(|e| {
            warn!(error = %e, %key, "failed to count recent tx times");
            0
        })
    }

    async fn record_amount(&self, user_id: &str, amount: f64, max_size: usize) {
        let key = amounts_key(user_id);
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = async {
            conn.lpush(&key, amount.to_string()).await?;
            conn.ltrim(&key, 0, max_size as isize - 1).await?;
            conn.expire(&key, AMOUNT_TTL_SECS).await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, %key, "failed to record amount");
        }
    }

    async fn median_amount(&self, user_id: &str) -> f64 {
        let key = amounts_key(user_id);
        let mut conn = self.conn.clone();
        let raw: redis::RedisResult<Vec<String>> = conn.lrange(&key, 0, -1).await;
        match raw {
            Ok(values) => {
                let parsed = values
                    .iter()
                    .map(|s| s.parse::<f64>().unwrap_or(0.0))
                    .collect();
                median_of(parsed)
            }
            Err(e) => {
                warn!(error = %e, %key, "failed to read amount history");
                0.0
            }
        }
    }

    async fn observe_device(&self, user_id: &str, device_id: &str, ts: i64) -> bool {
        self.observe(devices_key(user_id), device_id, ts, FIRST_SEEN_TTL_SECS)
            .await
    }

    async fn device_first_seen(&self, user_id: &str, device_id: &str) -> Option<i64> {
        self.first_seen(devices_key(user_id), device_id).await
    }

    async fn observe_ip(&self, user_id: &str, ip: &str, ts: i64) -> bool {
        self.observe(ips_key(user_id), ip, ts, FIRST_SEEN_TTL_SECS)
            .await
    }

    async fn ip_first_seen(&self, user_id: &str, ip: &str) -> Option<i64> {
        self.first_seen(ips_key(user_id), ip).await
    }

    async fn get_last_location(&self, user_id: &str) -> Option<(f64, f64, i64)> {
        let key = location_key(user_id);
        let mut conn = self.conn.clone();
        let raw: redis::RedisResult<(Option<f64>, Option<f64>, Option<i64>)> = async {
            let lat = conn.hget(&key, "lat").await?;
            let lon = conn.hget(&key, "lon").await?;
            let ts = conn.hget(&key, "ts").await?;
            Ok((lat, lon, ts))
        }
        .await;
        match raw {
            Ok((Some(lat), Some(lon), Some(ts))) => Some((lat, lon, ts)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, %key, "failed to read last location");
                None
            }
        }
    }

    async fn set_last_location(&self, user_id: &str, lat: f64, lon: f64, ts: i64) {
        let key = location_key(user_id);
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = async {
            conn.hset_multiple(&key, &[("lat", lat), ("lon", lon), ("ts", ts as f64)])
                .await?;
            conn.expire(&key, LOCATION_TTL_SECS).await?;
            Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, %key, "failed to set last location");
        }
    }
}

#[derive(Default)]
struct UserState {
    tx_times: Vec<i64>,
    amounts: Vec<f64>,
    devices: HashMap<String, i64>,
    ips: HashMap<String, i64>,
    location: Option<(f64, f64, i64)>,
}

/// Plain in-memory implementation used by unit and integration tests; never
/// fails, so it exercises the "happy path" of every contract exactly.
#[derive(Default)]
pub struct InMemoryStateStore {
    users: Mutex<HashMap<String, UserState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn record_tx_time(&self, user_id: &str, ts: i64) {
        let mut users = self.users.lock().unwrap();
        let state = users.entry(user_id.to_string()).or_default();
        state.tx_times.push(ts);
        let cutoff = ts - TX_TIME_WINDOW_SECS;
        state.tx_times.retain(|&t| t >= cutoff);
    }

    async fn recent_count(&self, user_id: &str, now: i64, window_sec: i64) -> u32 {
        let users = self.users.lock().unwrap();
        users
            .get(user_id)
            .map(|s| {
                s.tx_times
                    .iter()
                    .filter(|&&t| t >= now - window_sec && t <= now)
                    .count() as u32
            })
            .unwrap_or(0)
    }

    async fn record_amount(&self, user_id: &str, amount: f64, max_size: usize) {
        let mut users = self.users.lock().unwrap();
        let state = users.entry(user_id.to_string()).or_default();
        state.amounts.insert(0, amount);
        state.amounts.truncate(max_size);
    }

    async fn median_amount(&self, user_id: &str) -> f64 {
        let users = self.users.lock().unwrap();
        users
            .get(user_id)
            .map(|s| median_of(s.amounts.clone()))
            .unwrap_or(0.0)
    }

    async fn observe_device(&self, user_id: &str, device_id: &str, ts: i64) -> bool {
        let mut users = self.users.lock().unwrap();
        let state = users.entry(user_id.to_string()).or_default();
        match state.devices.get(device_id) {
            Some(_) => false,
            None => {
                state.devices.insert(device_id.to_string(), ts);
                true
            }
        }
    }

    async fn device_first_seen(&self, user_id: &str, device_id: &str) -> Option<i64> {
        let users = self.users.lock().unwrap();
        users.get(user_id).and_then(|s| s.devices.get(device_id)).copied()
    }

    async fn observe_ip(&self, user_id: &str, ip: &str, ts: i64) -> bool {
        let mut users = self.users.lock().unwrap();
        let state = users.entry(user_id.to_string()).or_default();
        match state.ips.get(ip) {
            Some(_) => false,
            None => {
                state.ips.insert(ip.to_string(), ts);
                true
            }
        }
    }

    async fn ip_first_seen(&self, user_id: &str, ip: &str) -> Option<i64> {
        let users = self.users.lock().unwrap();
        users.get(user_id).and_then(|s| s.ips.get(ip)).copied()
    }

    async fn get_last_location(&self, user_id: &str) -> Option<(f64, f64, i64)> {
        let users = self.users.lock().unwrap();
        users.get(user_id).and_then(|s| s.location)
    }

    async fn set_last_location(&self, user_id: &str, lat: f64, lon: f64, ts: i64) {
        let mut users = self.users.lock().unwrap();
        let state = users.entry(user_id.to_string()).or_default();
        state.location = Some((lat, lon, ts));
    }
}
