//! Rule Engine (§4.2): a pure function from a transaction plus the state
//! signals read for its user to a partial score, ordered reason tags, and
//! the rule-bit features the extractor mirrors into the model vector.
//!
//! Deliberately reads nothing and writes nothing itself — every input
//! arrives pre-fetched in `StateSignals` so this stays a pure, trivially
//! testable function. State mutation is the stream processor's job (§4.6
//! step 5), run only after this evaluation completes.

use crate::config::RulesConfig;
use crate::domain::{ReasonList, ReasonTag, Transaction};
use crate::state::implied_speed_kmph;

const ACCEPTED_CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "CAD", "AUD"];

/// Everything the rule engine needs about a user's prior state, read once up
/// front by the stream processor (§4.6 step 3) before any writes happen.
#[derive(Debug, Clone, Default)]
pub struct StateSignals {
    pub recent_count_in_window: u32,
    pub median_amount: f64,
    /// First observation, or seen within the configured freshness window —
    /// the processor folds the raw first-seen timestamp and `now` into this
    /// single bool before the engine ever sees it (§4.2 `new_device`).
    pub device_is_new: bool,
    pub ip_is_new: bool,
    pub last_location: Option<(f64, f64, i64)>,
}

/// Per-rule 0/1 bits, mirrored verbatim into feature extractor slots (§4.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBits {
    pub invalid_amount: bool,
    pub high_amount: bool,
    pub bad_currency: bool,
    pub burst: bool,
    pub new_device_or_ip: bool,
    pub geo_impossible: bool,
}

#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub score: f64,
    pub reasons: ReasonList,
    pub bits: RuleBits,
    /// Implied travel speed used by `geo_impossible`, or 0 if no prior
    /// location was available. Feeds the extractor's `required_speed_kmph`.
    pub implied_speed_kmph: f64,
}

/// Evaluate every rule in the table order specified (§4.2); score saturates
/// at 100 and `reasons` never contains a duplicate tag.
pub fn evaluate(tx: &Transaction, signals: &StateSignals, cfg: &RulesConfig) -> RuleOutcome {
    let mut score = 0.0_f64;
    let mut reasons = ReasonList::new();
    let mut bits = RuleBits::default();

    if tx.has_invalid_amount() {
        score += 100.0;
        reasons.push(ReasonTag::InvalidAmount);
        bits.invalid_amount = true;
    }

    if let Some(amount) = tx.amount {
        if amount >= 1000.0 {
            score += 60.0;
            reasons.push(ReasonTag::HighAmount);
            bits.high_amount = true;
        }
    }

    if !is_accepted_currency(tx.currency.as_deref()) {
        score += 40.0;
        reasons.push(ReasonTag::BadCurrency);
        bits.bad_currency = true;
    }

    let hour = tx.occurred_at.format("%H").to_string().parse::<u32>().unwrap_or(0);
    if (0..=5).contains(&hour) {
        score += 20.0;
        reasons.push(ReasonTag::NightTime);
    }

    if signals.recent_count_in_window >= cfg.burst_count {
        score += cfg.burst_score;
        reasons.push(ReasonTag::Burst60s);
        bits.burst = true;
    }

    if signals.median_amount > 0.0 {
        if let Some(amount) = tx.amount {
            if amount >= signals.median_amount * cfg.spend_multiplier {
                score += 30.0;
                reasons.push(ReasonTag::SpendSpike);
            }
        }
    }

    if tx.device_id().is_some() && signals.device_is_new {
        score += 20.0;
        reasons.push(ReasonTag::NewDevice);
        bits.new_device_or_ip = true;
    }

    if tx.ip().is_some() && signals.ip_is_new {
        score += 15.0;
        reasons.push(ReasonTag::NewIp);
        bits.new_device_or_ip = true;
    }

    let mut implied_speed = 0.0;
    if let (Some(loc), Some((last_lat, last_lon, last_ts))) =
        (tx.location.clone(), signals.last_location)
    {
        let km = crate::state::haversine_km(last_lat, last_lon, loc.lat, loc.lon);
        let dt = tx.occurred_at.timestamp() - last_ts;
        implied_speed = implied_speed_kmph(km, dt);
        if implied_speed > cfg.geo_max_speed_kmph {
            score += cfg.geo_score;
            reasons.push(ReasonTag::GeoImpossible);
            bits.geo_impossible = true;
        }
    }

    RuleOutcome {
        score: score.min(100.0),
        reasons,
        bits,
        implied_speed_kmph: implied_speed,
    }
}

/// First observation (`None`) or seen within `within_days` of `now`.
/// Used by the stream processor to fold a raw first-seen read into the
/// `device_is_new`/`ip_is_new` bits the engine consumes (§4.2 `new_device`).
pub fn is_within_freshness_window(first_seen: Option<i64>, now: i64, within_days: i64) -> bool {
    match first_seen {
        None => true,
        Some(ts) => (now - ts) <= within_days * 24 * 3600,
    }
}

/// `true` when the field is unset, non-3-letter, or outside the accepted
/// set — all three trigger `bad_currency` identically (§4.2).
fn is_accepted_currency(currency: Option<&str>) -> bool {
    match currency {
        Some(c) if c.len() == 3 => ACCEPTED_CURRENCIES.contains(&c),
        _ => false,
    }
}
