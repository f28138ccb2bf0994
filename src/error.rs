//! Error types for the prediction service

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by model loading and inference
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No artifact exists at the configured path
    #[error("model artifact not found at {}", .0.display())]
    NotFound(PathBuf),

    /// Artifact exists but could not be turned into a usable model
    #[error("failed to load model from {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    /// No model handle is available to serve the request
    #[error("model not loaded")]
    ModelUnavailable,

    /// Feature mapping is empty or malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Failure inside the underlying model call
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ServiceError {
    /// Wrap any displayable failure from the inference runtime
    pub fn inference(err: impl std::fmt::Display) -> Self {
        ServiceError::Inference(err.to_string())
    }

    /// Human-readable reason returned to HTTP callers.
    ///
    /// Never includes the inner message, which may quote request values.
    pub fn detail(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_)
            | ServiceError::Load { .. }
            | ServiceError::ModelUnavailable => "Model not loaded",
            ServiceError::InvalidInput(_) => "Invalid feature payload",
            ServiceError::Inference(_) => "Inference failed",
        }
    }

    /// Short outcome label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Load { .. } => "load",
            ServiceError::ModelUnavailable => "model_unavailable",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::Inference(_) => "inference",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
