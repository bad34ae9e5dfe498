// src/error.rs

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Every failure the pipeline, the acquisition boundary and the feedback loop can report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Window, overlap or filter parameters are inconsistent.
    #[error("[{stage}] invalid configuration: {reason}")]
    InvalidConfiguration { stage: &'static str, reason: String },

    /// The live stream has not accumulated enough samples yet. Retryable.
    #[error("insufficient data: requested {requested} samples, {available} available")]
    InsufficientData { requested: usize, available: usize },

    /// A vector or matrix does not have the width a fitted transform expects.
    #[error("[{stage}] dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A transform or codec was applied before being fit.
    #[error("[{stage}] used before fit")]
    NotFitted { stage: &'static str },

    /// The acquisition board failed to connect or stream.
    #[error("acquisition failure during {operation}: {reason}")]
    AcquisitionFailure {
        operation: &'static str,
        reason: String,
    },

    #[error("unknown label: {0}")]
    UnknownLabel(String),

    #[error("malformed recording: {0}")]
    MalformedRecording(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Network weights could not be encoded, decoded or read back from a tensor.
    #[error("model weights: {0}")]
    ModelWeights(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PipelineError {
    /// Only a short stream is worth retrying; everything else aborts the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::InsufficientData { .. })
    }

    pub fn invalid(stage: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::InvalidConfiguration {
            stage,
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn acquisition(operation: &'static str, reason: impl Into<String>) -> Self {
        PipelineError::AcquisitionFailure {
            operation,
            reason: reason.into(),
        }
    }
}
