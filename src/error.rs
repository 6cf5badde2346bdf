//! Error types for the training pipeline and the inference adapter

use thiserror::Error;

/// Errors that abort a training run
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Labeling error: {0}")]
    Labeling(String),

    #[error("Fit error: {0}")]
    Fit(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Report error: {0}")]
    Report(String),
}

impl From<csv::Error> for TrainError {
    fn from(e: csv::Error) -> Self {
        TrainError::Dataset(e.to_string())
    }
}

/// Errors returned to callers of the inference adapter
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Unknown {field} category {value:?}: not seen during training")]
    UnknownCategory { field: String, value: String },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Artifact bundle incomplete: missing {missing}")]
    BundleIncomplete { missing: String },

    #[error("Artifact bundle corrupt: {0}")]
    BundleCorrupt(String),
}

impl InferenceError {
    /// True when the caller can recover by correcting its input
    pub fn is_input_error(&self) -> bool {
        matches!(self, InferenceError::UnknownCategory { .. })
    }
}
