//! Durable decision store (§6.4): a WAL-mode SQLite table keyed by
//! `transaction_id`, where a primary-key conflict is the idempotency
//! mechanism itself rather than an error path to special-case.

use crate::domain::{Category, Decision};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS fraud_decisions (
    transaction_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    decision TEXT NOT NULL,
    score DOUBLE PRECISION NOT NULL,
    reasons_csv TEXT,
    latency_ms BIGINT NOT NULL,
    evaluated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fraud_decisions_user ON fraud_decisions(user_id);
CREATE INDEX IF NOT EXISTS idx_fraud_decisions_decision ON fraud_decisions(decision);
CREATE INDEX IF NOT EXISTS idx_fraud_decisions_evaluated_at ON fraud_decisions(evaluated_at DESC);
CREATE INDEX IF NOT EXISTS idx_fraud_decisions_user_evaluated_at ON fraud_decisions(user_id, evaluated_at DESC);
"#;

/// `true` when the insert was newly applied, `false` when a prior record
/// for this `transaction_id` already existed (the idempotent no-op path).
pub struct InsertOutcome {
    pub inserted: bool,
}

pub struct DecisionStore {
    conn: Arc<Mutex<Connection>>,
}

impl DecisionStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open decision store at {db_path}"))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize decision store schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!(journal_mode, "WAL mode not active for decision store");
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM fraud_decisions", [], |row| row.get(0))
            .unwrap_or(0);
        info!(existing_decisions = count, path = db_path, "decision store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `true` iff a decision for this `transactionId` already exists
    /// (§4.6 step 2, the idempotency gate).
    pub fn exists(&self, transaction_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM fraud_decisions WHERE transaction_id = ?1",
            params![transaction_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Insert, treating a primary-key conflict as an accepted no-op rather
    /// than an error (§4.6 step 9, §7).
    pub fn insert(&self, decision: &Decision) -> Result<InsertOutcome> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO fraud_decisions \
             (transaction_id, user_id, decision, score, reasons_csv, latency_ms, evaluated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                decision.transaction_id,
                decision.user_id,
                decision.decision.to_string(),
                decision.score,
                decision.reasons.join("|"),
                decision.latency_ms as i64,
                decision.evaluated_at.to_rfc3339(),
            ],
        )?;
        Ok(InsertOutcome {
            inserted: changed > 0,
        })
    }

    #[cfg(test)]
    pub fn get(&self, transaction_id: &str) -> Result<Option<Decision>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT transaction_id, user_id, decision, score, reasons_csv, latency_ms, evaluated_at \
             FROM fraud_decisions WHERE transaction_id = ?1",
            params![transaction_id],
            |row| {
                let decision_str: String = row.get(2)?;
                let reasons_csv: Option<String> = row.get(4)?;
                let evaluated_at: String = row.get(6)?;
                Ok(Decision {
                    transaction_id: row.get(0)?,
                    user_id: row.get(1)?,
                    decision: Category::from_str(&decision_str).unwrap_or(Category::Allow),
                    score: row.get(3)?,
                    reasons: reasons_csv
                        .unwrap_or_default()
                        .split('|')
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect(),
                    latency_ms: row.get::<_, i64>(5)? as u64,
                    evaluated_at: chrono::DateTime::parse_from_rfc3339(&evaluated_at)
                        .unwrap()
                        .with_timezone(&chrono::Utc),
                })
            },
        );
        match result {
            Ok(d) => Ok(Some(d)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
