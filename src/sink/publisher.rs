//! Decision Sink (§4.7): the publish + persist pair, with a bounded retry
//! in front of each effect. Exhausting retries escalates to the processor's
//! failure path rather than retrying indefinitely in-band — the caller is
//! expected to leave the input message unacknowledged on `Err`.

use crate::config::SinkConfig;
use crate::domain::Decision;
use crate::error::PipelineError;
use crate::sink::decision_store::DecisionStore;
use crate::stream::bus::MessagePublisher;
use tokio::time::sleep;
use tracing::warn;

/// Publish `decision` to the outbound topic with a bounded retry.
pub async fn publish_with_retry(
    publisher: &dyn MessagePublisher,
    topic: &str,
    decision: &Decision,
    cfg: &SinkConfig,
) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(decision)?;
    let mut attempt = 0;
    loop {
        match publisher.publish(topic, &decision.user_id, &payload).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < cfg.max_retries => {
                attempt += 1;
                warn!(attempt, error = %e, "decision publish failed, retrying");
                sleep(cfg.retry_backoff()).await;
            }
            Err(e) => {
                return Err(PipelineError::SinkExhausted {
                    attempts: attempt,
                    source: e,
                }
                .into())
            }
        }
    }
}

/// Persist `decision` with a bounded retry around the write itself; a
/// primary-key conflict is not a failure and never consumes a retry (§7).
pub fn persist_with_retry(
    store: &DecisionStore,
    decision: &Decision,
    cfg: &SinkConfig,
) -> anyhow::Result<()> {
    let mut attempt = 0;
    loop {
        match store.insert(decision) {
            Ok(_) => return Ok(()),
            Err(e) if attempt < cfg.max_retries => {
                attempt += 1;
                warn!(attempt, error = %e, "decision persist failed, retrying");
            }
            Err(e) => {
                return Err(PipelineError::SinkExhausted {
                    attempts: attempt,
                    source: e,
                }
                .into())
            }
        }
    }
}
