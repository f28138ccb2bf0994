//! Capability surface of a loaded model

use crate::error::Result;
use crate::models::frame::FeatureFrame;

/// Model that returns per-class probabilities for every input row
pub trait ProbabilisticModel: Send + Sync {
    fn predict_proba(&self, frame: &FeatureFrame) -> Result<Vec<Vec<f64>>>;
}

/// Model that returns one discrete label for every input row
pub trait DeterministicModel: Send + Sync {
    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<i64>>;
}

/// Opaque model handle produced by the loader.
///
/// Implementations expose zero, one or both capabilities; the inference
/// engine prefers probabilities when both are available.
pub trait Model: Send + Sync {
    /// Name used in log fields
    fn name(&self) -> &str;

    fn probabilistic(&self) -> Option<&dyn ProbabilisticModel> {
        None
    }

    fn deterministic(&self) -> Option<&dyn DeterministicModel> {
        None
    }
}

/// Inference call resolved from a model's capabilities
pub enum Inference<'a> {
    Probabilistic(&'a dyn ProbabilisticModel),
    Deterministic(&'a dyn DeterministicModel),
}

impl<'a> Inference<'a> {
    /// Pick the inference call for a model, probabilities first
    pub fn detect(model: &'a dyn Model) -> Option<Self> {
        if let Some(call) = model.probabilistic() {
            return Some(Inference::Probabilistic(call));
        }
        model.deterministic().map(Inference::Deterministic)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Inference::Probabilistic(_) => "probabilistic",
            Inference::Deterministic(_) => "deterministic",
        }
    }
}
