//! ONNX model loader

use crate::error::{Result, ServiceError};
use crate::models::model::Model;
use crate::models::onnx::OnnxModel;
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Loader for the serving model artifact
#[derive(Debug, Clone)]
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
    /// Column order for graphs with a single packed input
    feature_order: Vec<String>,
}

impl ModelLoader {
    /// Create a loader with default settings (1 thread, name-ordered columns)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a loader with the given intra-op thread count
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
            feature_order: Vec::new(),
        }
    }

    /// Fix the column order used when the graph takes one packed input
    pub fn with_feature_order(mut self, feature_order: Vec<String>) -> Self {
        self.feature_order = feature_order;
        self
    }

    /// Load the artifact at `path`.
    ///
    /// Fails with [`ServiceError::NotFound`] when nothing exists at the path
    /// and [`ServiceError::Load`] when the file is not a usable model.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<OnnxModel> {
        let path = path.as_ref();

        info!(path = %path.display(), threads = self.onnx_threads, "Loading model artifact");

        if !path.is_file() {
            error!(path = %path.display(), "Model artifact not found");
            return Err(ServiceError::NotFound(path.to_path_buf()));
        }

        let session = self.build_session(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to load model artifact");
            ServiceError::Load {
                path: path.to_path_buf(),
                reason: format!("{:#}", e),
            }
        })?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());

        let model = OnnxModel::from_session(&name, path, session, &self.feature_order)
            .inspect_err(|e| {
                error!(path = %path.display(), error = %e, "Model artifact is not a usable classifier");
            })?;

        info!(
            model = %name,
            layout = ?model.layout(),
            probabilities = ?model.outputs().probabilities,
            label = ?model.outputs().label,
            "Model loaded successfully"
        );

        Ok(model)
    }

    /// Load the artifact as a shareable model handle
    pub fn load_shared<P: AsRef<Path>>(&self, path: P) -> Result<Arc<dyn Model>> {
        let model = self.load(path)?;
        Ok(Arc::new(model))
    }

    fn build_session(&self, path: &Path) -> anyhow::Result<Session> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)?;
        Ok(session)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load a model handle from `path` with default loader settings
pub fn load<P: AsRef<Path>>(path: P) -> Result<Arc<dyn Model>> {
    ModelLoader::new().load_shared(path)
}
