// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Typed failures raised by the domain, data and ML layers.
// Application code wraps them in anyhow with context.

/// Failures with a defined policy. Parsing and configuration errors abort the
/// current load before any partial state is kept; training errors surface
/// after the step that produced them.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReError {
    #[error("malformed span field `{field}`: {raw}")]
    MalformedSpan { field: String, raw: String },

    #[error("unknown entity type code: {0}")]
    UnknownEntityType(String),

    #[error("unknown marking strategy: {0}")]
    UnknownStrategy(String),

    #[error("unknown relation label: {0}")]
    UnknownLabel(String),

    #[error("unknown loss kind: {0}")]
    UnknownLoss(String),

    #[error("invalid {loss} parameter: {reason}")]
    InvalidLoss { loss: String, reason: String },

    #[error("subject and object spans overlap in record {id}")]
    OverlappingSpans { id: String },

    #[error("{features} feature rows but {labels} labels")]
    MisalignedColumns { features: usize, labels: usize },

    #[error("index {index} out of range for dataset of size {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("non-finite loss {loss} in fold {fold} at step {step}")]
    TrainingDivergence { fold: usize, step: usize, loss: f64 },
}

impl ReError {
    pub fn malformed(field: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedSpan { field: field.into(), raw: raw.into() }
    }
}
