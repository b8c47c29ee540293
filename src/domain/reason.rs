use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of reason tags a decision may carry (§4.2 + `ml_high_risk`).
///
/// Order of the variants mirrors the rule evaluation order specified in the
/// rule table; `reasons::ordered_push` relies on that table order, not on
/// this enum's declaration order, so adding a variant here is safe as long
/// as `rules::engine` inserts it in the right place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonTag {
    InvalidAmount,
    HighAmount,
    BadCurrency,
    NightTime,
    #[serde(rename = "burst_60s")]
    Burst60s,
    SpendSpike,
    NewDevice,
    NewIp,
    GeoImpossible,
    MlHighRisk,
}

impl ReasonTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonTag::InvalidAmount => "invalid_amount",
            ReasonTag::HighAmount => "high_amount",
            ReasonTag::BadCurrency => "bad_currency",
            ReasonTag::NightTime => "night_time",
            ReasonTag::Burst60s => "burst_60s",
            ReasonTag::SpendSpike => "spend_spike",
            ReasonTag::NewDevice => "new_device",
            ReasonTag::NewIp => "new_ip",
            ReasonTag::GeoImpossible => "geo_impossible",
            ReasonTag::MlHighRisk => "ml_high_risk",
        }
    }
}

impl fmt::Display for ReasonTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered, deduplicated list of reason tags.
///
/// Insertion order is preserved (the rule table order), and `push` is a
/// no-op if the tag is already present — this is what gives the pipeline
/// its "duplicates MUST NOT appear" guarantee without every call site
/// needing to check first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReasonList(Vec<ReasonTag>);

impl ReasonList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, tag: ReasonTag) {
        if !self.0.contains(&tag) {
            self.0.push(tag);
        }
    }

    pub fn contains(&self, tag: ReasonTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn as_slice(&self) -> &[ReasonTag] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<ReasonTag> {
        self.0
    }

    /// Pipe-delimited form used for the `reasons_csv` column (§6.4).
    pub fn to_csv(&self) -> String {
        self.0
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join("|")
    }

    pub fn from_csv(csv: &str) -> Self {
        if csv.is_empty() {
            return Self::new();
        }
        let mut out = Self::new();
        for part in csv.split('|') {
            if let Some(tag) = parse_tag(part) {
                out.push(tag);
            }
        }
        out
    }
}

fn parse_tag(s: &str) -> Option<ReasonTag> {
    use ReasonTag::*;
    Some(match s {
        "invalid_amount" => InvalidAmount,
        "high_amount" => HighAmount,
        "bad_currency" => BadCurrency,
        "night_time" => NightTime,
        "burst_60s" => Burst60s,
        "spend_spike" => SpendSpike,
        "new_device" => NewDevice,
        "new_ip" => NewIp,
        "geo_impossible" => GeoImpossible,
        "ml_high_risk" => MlHighRisk,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_deduplicates() {
        let mut reasons = ReasonList::new();
        reasons.push(ReasonTag::HighAmount);
        reasons.push(ReasonTag::NightTime);
        reasons.push(ReasonTag::HighAmount);
        assert_eq!(reasons.as_slice(), &[ReasonTag::HighAmount, ReasonTag::NightTime]);
    }

    #[test]
    fn csv_round_trips() {
        let mut reasons = ReasonList::new();
        reasons.push(ReasonTag::HighAmount);
        reasons.push(ReasonTag::GeoImpossible);
        let csv = reasons.to_csv();
        assert_eq!(csv, "high_amount|geo_impossible");
        assert_eq!(ReasonList::from_csv(&csv), reasons);
    }

    #[test]
    fn empty_csv_round_trips() {
        assert_eq!(ReasonList::new().to_csv(), "");
        assert_eq!(ReasonList::from_csv(""), ReasonList::new());
    }
}
