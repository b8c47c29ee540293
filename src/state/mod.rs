//! Warm per-user state: the transaction-time series, amount history,
//! device/IP first-seen maps, and last-known location that the rule engine
//! reads and updates on every transaction (§4.1).

pub mod geo;
pub mod store;

pub use geo::{haversine_km, implied_speed_kmph};
pub use store::{InMemoryStateStore, RedisStateStore, StateStore};
