//! Feature Extractor (§4.3): the fixed 18-slot numeric vector handed to the
//! model client. Slot order is a versioned contract with the model — see
//! `SLOT_NAMES` and `Config::model_expected_feature_count`, checked once at
//! startup rather than per-transaction.

use crate::domain::Transaction;
use crate::rules::{RuleBits, StateSignals};

pub const FEATURE_COUNT: usize = 18;

/// Canonical slot order, kept alongside the constant so a reviewer can read
/// off what index 7 means without cross-referencing the model repo.
pub const SLOT_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "log1p_amount",
    "hour_of_day",
    "is_night",
    "currency_code",
    "has_device",
    "has_ip",
    "has_location",
    "recent_count_60s",
    "median_amount",
    "spend_deviation_ratio",
    "required_speed_kmph",
    "bit_invalid_amount",
    "bit_high_amount",
    "bit_bad_currency",
    "bit_burst",
    "bit_new_device_or_ip",
    "bit_geo_impossible",
];

fn currency_code(currency: Option<&str>) -> f64 {
    match currency {
        Some("USD") => 1.0,
        Some("EUR") => 2.0,
        Some("GBP") => 3.0,
        Some("CAD") => 4.0,
        Some("AUD") => 5.0,
        _ => 0.0,
    }
}

/// Assemble the vector from the transaction, the same state signals the
/// rule engine saw, and the rule engine's own outcome. Missing optional
/// inputs contribute `0.0`, never a null/NaN slot.
pub fn extract(
    tx: &Transaction,
    signals: &StateSignals,
    bits: &RuleBits,
    implied_speed_kmph: f64,
) -> [f64; FEATURE_COUNT] {
    let amount = tx.amount.unwrap_or(0.0).max(0.0);
    let hour = tx.occurred_at.format("%H").to_string().parse::<u32>().unwrap_or(0);
    let is_night = if (0..=5).contains(&hour) { 1.0 } else { 0.0 };

    let spend_deviation_ratio = if signals.median_amount > 0.0 {
        (amount / signals.median_amount) - 1.0
    } else {
        0.0
    };

    [
        amount,
        amount.ln_1p(),
        hour as f64,
        is_night,
        currency_code(tx.currency.as_deref()),
        if tx.device_id().is_some() { 1.0 } else { 0.0 },
        if tx.ip().is_some() { 1.0 } else { 0.0 },
        if tx.location.is_some() { 1.0 } else { 0.0 },
        signals.recent_count_in_window as f64,
        signals.median_amount,
        spend_deviation_ratio,
        implied_speed_kmph,
        bool_slot(bits.invalid_amount),
        bool_slot(bits.high_amount),
        bool_slot(bits.bad_currency),
        bool_slot(bits.burst),
        bool_slot(bits.new_device_or_ip),
        bool_slot(bits.geo_impossible),
    ]
}

fn bool_slot(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tx() -> Transaction {
        Transaction {
            transaction_id: "t1".into(),
            user_id: "u1".into(),
            amount: None,
            currency: None,
            merchant_id: None,
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap(),
            device: None,
            location: None,
        }
    }

    #[test]
    fn vector_has_exactly_18_slots() {
        let v = extract(&tx(), &StateSignals::default(), &RuleBits::default(), 0.0);
        assert_eq!(v.len(), FEATURE_COUNT);
        assert_eq!(SLOT_NAMES.len(), FEATURE_COUNT);
    }

    #[test]
    fn missing_amount_contributes_zero_not_nan() {
        let v = extract(&tx(), &StateSignals::default(), &RuleBits::default(), 0.0);
        assert_eq!(v[0], 0.0);
        assert!(v.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn unknown_currency_maps_to_zero() {
        assert_eq!(currency_code(Some("ZZZ")), 0.0);
        assert_eq!(currency_code(Some("USD")), 1.0);
    }

    #[test]
    fn spend_deviation_ratio_is_zero_when_no_baseline() {
        let mut signals = StateSignals::default();
        signals.median_amount = 0.0;
        let mut t = tx();
        t.amount = Some(500.0);
        let v = extract(&t, &signals, &RuleBits::default(), 0.0);
        assert_eq!(v[10], 0.0);
    }

    #[test]
    fn night_bit_matches_hour_boundary() {
        let v = extract(&tx(), &StateSignals::default(), &RuleBits::default(), 0.0);
        assert_eq!(v[3], 1.0); // hour 3 is night
    }
}
