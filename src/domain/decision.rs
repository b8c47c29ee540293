use super::reason::ReasonList;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The terminal risk category. Declaration order matters: derive(PartialOrd)
/// relies on it to give `Allow < Review < Block` (§8 monotonicity property).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Allow,
    Review,
    Block,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Allow => "ALLOW",
            Category::Review => "REVIEW",
            Category::Block => "BLOCK",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOW" => Ok(Category::Allow),
            "REVIEW" => Ok(Category::Review),
            "BLOCK" => Ok(Category::Block),
            other => Err(format!("unknown decision category: {other}")),
        }
    }
}

/// The emitted, immutable decision for one transaction (§3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub decision: Category,
    pub score: f64,
    pub reasons: Vec<String>,
    #[serde(rename = "latencyMs")]
    pub latency_ms: u64,
    #[serde(rename = "evaluatedAt")]
    pub evaluated_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        transaction_id: String,
        user_id: String,
        decision: Category,
        score: f64,
        reasons: ReasonList,
        latency_ms: u64,
        evaluated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            user_id,
            decision,
            score,
            reasons: reasons
                .as_slice()
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            latency_ms,
            evaluated_at,
        }
    }
}

impl PartialEq for Decision {
    fn eq(&self, other: &Self) -> bool {
        self.transaction_id == other.transaction_id
    }
}
