//! Pure per-transaction rule evaluation (§4.2).

pub mod engine;

pub use engine::{evaluate, is_within_freshness_window, RuleBits, RuleOutcome, StateSignals};
