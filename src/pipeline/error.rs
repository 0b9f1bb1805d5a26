use std::path::PathBuf;

use thiserror::Error;

use crate::models::{LoadFailure, ModelError};

/// Failures that end a request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The image could not be read or decoded.
    #[error("Invalid image {}: {reason}", path.display())]
    InvalidInput { path: PathBuf, reason: String },
    /// The classifier could not be loaded; retry later.
    #[error("Classifier unavailable: {0}")]
    ModelUnavailable(#[from] LoadFailure),
    /// The classifier ran but produced nothing usable.
    #[error("Classification failed: {0}")]
    Processing(#[from] ModelError),
}

impl AnalysisError {
    /// HTTP status an outer boundary should map this failure to.
    pub fn http_status(&self) -> u16 {
        match self {
            AnalysisError::InvalidInput { .. } => 400,
            AnalysisError::ModelUnavailable(_) => 503,
            AnalysisError::Processing(_) => 500,
        }
    }

    /// Whether the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::ModelUnavailable(_))
    }
}

/// Why the optional segmentation branch produced no location.
///
/// Never fails a request; it only downgrades the report.
#[derive(Debug, Clone, Error)]
pub enum SegmentationFailure {
    /// The segmenter could not be loaded.
    #[error("Segmenter unavailable: {0}")]
    Unavailable(#[from] LoadFailure),
    /// The segmenter failed while predicting.
    #[error("Segmentation failed: {0}")]
    Model(#[from] ModelError),
    /// Mask post-processing panicked.
    #[error("Mask analysis failed: {0}")]
    Analysis(String),
}
