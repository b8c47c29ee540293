//! Score Combiner & Decision Classifier (§4.5): blends the rule engine's
//! score with the model's probability, then maps the blended score to a
//! category under configurable, order-preserving thresholds.

use crate::config::{RulesConfig, ThresholdsConfig};
use crate::domain::{Category, ReasonList, ReasonTag};

/// `finalScore = clamp(ruleWeight*ruleScore + mlWeight*(probability*100), 0, 100)`.
/// Appends `ml_high_risk` (deduped by `ReasonList`) when the model alone
/// would have flagged high risk and the model actually carries weight.
///
/// `invalid_amount` is a hard override (§8): a transaction with no usable
/// amount must land at score 100 / BLOCK regardless of what the model says,
/// since an absent amount means there is nothing coherent left to blend.
pub fn combine(
    rule_score: f64,
    invalid_amount: bool,
    ml_probability: f64,
    ml_weight: f64,
    rules: &RulesConfig,
    reasons: &mut ReasonList,
) -> f64 {
    if ml_probability >= 0.7 && ml_weight > 0.0 {
        reasons.push(ReasonTag::MlHighRisk);
    }

    if invalid_amount {
        return 100.0;
    }

    let blended = rules.weight * rule_score + ml_weight * (ml_probability * 100.0);
    blended.clamp(0.0, 100.0)
}

/// Inclusive-bound classification (§4.5): `score < review` → ALLOW,
/// `review <= score < block` → REVIEW, `score >= block` → BLOCK. Ordering
/// `ALLOW < REVIEW < BLOCK` always holds regardless of configured thresholds
/// as long as `review < block` (enforced at config validation time).
pub fn classify(score: f64, thresholds: &ThresholdsConfig) -> Category {
    if score >= thresholds.block {
        Category::Block
    } else if score >= thresholds.review {
        Category::Review
    } else {
        Category::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_cfg(weight: f64) -> RulesConfig {
        RulesConfig {
            burst_window_sec: 60,
            burst_count: 3,
            burst_score: 40.0,
            geo_max_speed_kmph: 900.0,
            geo_score: 50.0,
            device_new_within_days: 7,
            ip_new_within_days: 7,
            spend_multiplier: 5.0,
            spend_history_size: 10,
            weight,
        }
    }

    fn thresholds() -> ThresholdsConfig {
        ThresholdsConfig {
            review: 30.0,
            block: 60.0,
        }
    }

    #[test]
    fn blend_is_weighted_sum_clamped_to_100() {
        let mut reasons = ReasonList::new();
        let score = combine(100.0, false, 1.0, 0.5, &rules_cfg(0.5), &mut reasons);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn invalid_amount_forces_100_regardless_of_model() {
        let mut reasons = ReasonList::new();
        let score = combine(100.0, true, 0.0, 0.5, &rules_cfg(0.5), &mut reasons);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn ml_high_risk_requires_weight_and_probability_threshold() {
        let mut reasons = ReasonList::new();
        combine(0.0, false, 0.8, 0.5, &rules_cfg(0.5), &mut reasons);
        assert!(reasons.contains(ReasonTag::MlHighRisk));

        let mut reasons_no_weight = ReasonList::new();
        combine(0.0, false, 0.8, 0.0, &rules_cfg(0.5), &mut reasons_no_weight);
        assert!(!reasons_no_weight.contains(ReasonTag::MlHighRisk));
    }

    #[test]
    fn ml_high_risk_tag_is_deduplicated() {
        let mut reasons = ReasonList::new();
        combine(0.0, false, 0.9, 0.5, &rules_cfg(0.5), &mut reasons);
        combine(0.0, false, 0.9, 0.5, &rules_cfg(0.5), &mut reasons);
        assert_eq!(
            reasons.as_slice().iter().filter(|&&t| t == ReasonTag::MlHighRisk).count(),
            1
        );
    }

    #[test]
    fn classification_boundaries_are_inclusive_on_the_low_side() {
        let t = thresholds();
        assert_eq!(classify(29.99, &t), Category::Allow);
        assert_eq!(classify(30.0, &t), Category::Review);
        assert_eq!(classify(59.99, &t), Category::Review);
        assert_eq!(classify(60.0, &t), Category::Block);
    }

    #[test]
    fn ordering_allow_lt_review_lt_block_holds_for_custom_thresholds() {
        let t = ThresholdsConfig {
            review: 10.0,
            block: 90.0,
        };
        assert!(classify(5.0, &t) < classify(50.0, &t));
        assert!(classify(50.0, &t) < classify(95.0, &t));
    }

    #[test]
    fn monotonicity_score1_le_score2_implies_decision1_le_decision2() {
        let t = thresholds();
        let scores = [0.0, 15.0, 29.0, 30.0, 45.0, 59.0, 60.0, 100.0];
        for w in scores.windows(2) {
            assert!(classify(w[0], &t) <= classify(w[1], &t));
        }
    }
}
