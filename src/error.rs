use thiserror::Error;

/// Errors that cross a component boundary and are matched on by a caller,
/// as opposed to the ambient `anyhow::Error` used for "log and degrade"
/// failures within a single component.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema invalid: missing transactionId or userId")]
    SchemaInvalid,

    #[error("decision for transaction {0} already recorded")]
    DuplicateDecision(String),

    #[error("model feature count mismatch: extractor emits {extractor}, model expects {model}")]
    FeatureCountMismatch { extractor: usize, model: usize },

    #[error("decision sink exhausted {attempts} retries: {source}")]
    SinkExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// Stable, machine-matched token for contexts that key off the failure
    /// kind (DLQ envelopes, metrics labels) rather than the prose `Display`.
    pub fn tag(&self) -> &'static str {
        match self {
            PipelineError::SchemaInvalid => "schema_invalid",
            PipelineError::DuplicateDecision(_) => "duplicate_decision",
            PipelineError::FeatureCountMismatch { .. } => "feature_count_mismatch",
            PipelineError::SinkExhausted { .. } => "sink_exhausted",
        }
    }
}
