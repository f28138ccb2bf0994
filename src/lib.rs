//! Fraud Prediction Service Library
//!
//! Loads a single pre-trained ONNX classifier at startup and serves
//! synchronous per-transaction predictions over HTTP.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use config::AppConfig;
pub use error::ServiceError;
pub use models::inference::{InferenceEngine, PredictionResult};
pub use models::loader::ModelLoader;
pub use server::AppState;
