use thiserror::Error;

use crate::core::Split;

/// Errors surfaced to callers of the analysis pipeline.
///
/// Degenerate numerical cases (empty classes, zero Parzen volumes, too few class pairs
/// for the default threshold) are not errors: they are handled in place and logged.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("dimension mismatch: index holds {expected}-d vectors, query has {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("split `{0}` is not loaded")]
    MissingSplit(Split),

    #[error("split `{0}` has no rows to estimate class overlap from")]
    EmptySplit(Split),

    #[error("failed to load embedding model `{model}`: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("embedding model `{model}` failed to encode batch: {reason}")]
    Encode { model: String, reason: String },

    #[error("split has {texts} texts but {labels} labels")]
    LabelMismatch { texts: usize, labels: usize },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
