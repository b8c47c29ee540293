use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device fingerprint attached to a transaction, when the client supplied one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub ip: Option<String>,
    #[serde(rename = "userAgent")]
    pub user_agent: Option<String>,
}

/// Best-effort geolocation attached to a transaction. `city`/`country` ride
/// along with the transaction for audit/display purposes only — no rule or
/// feature reads them, `geo_impossible` works off `lat`/`lon` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// An inbound payment transaction as it arrives off the event bus.
///
/// Unknown JSON fields are ignored on deserialize; `transactionId` and
/// `userId` are the only fields required for a message to be admitted past
/// the schema gate (see `stream::processor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    #[serde(rename = "merchantId")]
    pub merchant_id: Option<String>,
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
    pub device: Option<Device>,
    pub location: Option<Location>,
}

impl Transaction {
    /// `true` when amount is missing or non-positive; drives the
    /// `invalid_amount` rule.
    pub fn has_invalid_amount(&self) -> bool {
        !matches!(self.amount, Some(a) if a > 0.0)
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device.as_ref().map(|d| d.id.as_str())
    }

    pub fn ip(&self) -> Option<&str> {
        self.device.as_ref().and_then(|d| d.ip.as_deref())
    }
}

/// The minimal well-formedness check applied before a message enters the
/// scoring pipeline. Anything else (missing amount, bad currency, ...) is a
/// scoring concern, not a schema concern, and is handled by the rule engine.
pub fn is_schema_valid(raw: &serde_json::Value) -> bool {
    raw.get("transactionId")
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.is_empty())
        && raw
            .get("userId")
            .and_then(|v| v.as_str())
            .is_some_and(|s| !s.is_empty())
}
