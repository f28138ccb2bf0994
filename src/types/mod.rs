//! Wire types for the HTTP API

pub mod prediction;

pub use prediction::{ErrorResponse, HealthResponse, PredictRequest, PredictResponse};
