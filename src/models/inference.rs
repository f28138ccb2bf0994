//! Inference engine: turns one feature mapping into a prediction

use crate::error::{Result, ServiceError};
use crate::models::frame::FeatureFrame;
use crate::models::model::{Inference, Model};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Result of model inference for a single row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Predicted class id
    pub prediction: u64,
    /// Confidence in the predicted class (0.0 - 1.0)
    pub confidence: f64,
    /// Version label configured for the served model
    pub model_version: String,
}

/// Run one prediction against an optional model handle.
///
/// The handle is checked before the features, so a missing model is reported
/// even for a malformed request.
pub fn predict(
    handle: Option<&dyn Model>,
    features: &HashMap<String, f64>,
    model_version: &str,
) -> Result<PredictionResult> {
    let model = handle.ok_or(ServiceError::ModelUnavailable)?;
    let frame = FeatureFrame::from_features(features)?;

    let inference = Inference::detect(model).ok_or_else(|| {
        ServiceError::Inference(format!(
            "model `{}` exposes neither probabilities nor labels",
            model.name()
        ))
    })?;

    let (prediction, confidence) = match &inference {
        Inference::Probabilistic(call) => {
            let rows = call.predict_proba(&frame)?;
            let row = rows.first().ok_or_else(|| {
                ServiceError::Inference("model returned no probability rows".to_string())
            })?;
            best_class(row)?
        }
        Inference::Deterministic(call) => {
            let labels = call.predict(&frame)?;
            let label = labels.first().copied().ok_or_else(|| {
                ServiceError::Inference("model returned no labels".to_string())
            })?;
            let class = u64::try_from(label).map_err(|_| {
                ServiceError::Inference(format!("model returned negative label {}", label))
            })?;
            (class, 1.0)
        }
    };

    debug!(
        model = %model.name(),
        call = inference.kind(),
        prediction = prediction,
        confidence = confidence,
        "Inference complete"
    );

    Ok(PredictionResult {
        prediction,
        confidence,
        model_version: model_version.to_string(),
    })
}

/// Arg-max of a probability row; ties resolve to the lowest class id
fn best_class(row: &[f64]) -> Result<(u64, f64)> {
    if row.iter().any(|p| p.is_nan()) {
        return Err(ServiceError::Inference(
            "model returned NaN probability".to_string(),
        ));
    }

    let mut best: Option<(usize, f64)> = None;
    for (class, &prob) in row.iter().enumerate() {
        match best {
            Some((_, top)) if prob <= top => {}
            _ => best = Some((class, prob)),
        }
    }

    let (class, prob) = best.ok_or_else(|| {
        ServiceError::Inference("model returned an empty probability row".to_string())
    })?;

    Ok((class as u64, prob.clamp(0.0, 1.0)))
}

/// Serving-side inference context: the model handle fixed at startup plus
/// the configured version label
#[derive(Clone)]
pub struct InferenceEngine {
    model: Option<Arc<dyn Model>>,
    model_version: String,
}

impl InferenceEngine {
    pub fn new(model: Option<Arc<dyn Model>>, model_version: impl Into<String>) -> Self {
        Self {
            model,
            model_version: model_version.into(),
        }
    }

    /// Engine with no model, answering every prediction with `ModelUnavailable`
    pub fn unavailable(model_version: impl Into<String>) -> Self {
        Self::new(None, model_version)
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// Name of the loaded model, if any
    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.name())
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Run inference on one feature mapping
    pub fn predict(&self, features: &HashMap<String, f64>) -> Result<PredictionResult> {
        predict(self.model.as_deref(), features, &self.model_version)
    }
}
