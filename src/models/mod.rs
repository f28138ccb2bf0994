//! Model loading and inference components

pub mod frame;
pub mod inference;
pub mod loader;
pub mod model;
pub mod onnx;

pub use frame::FeatureFrame;
pub use inference::{predict, InferenceEngine, PredictionResult};
pub use loader::{load, ModelLoader};
pub use model::{DeterministicModel, Inference, Model, ProbabilisticModel};
pub use onnx::OnnxModel;
