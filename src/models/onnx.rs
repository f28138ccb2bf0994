//! ONNX Runtime adapter for the model capability traits

use crate::error::{Result, ServiceError};
use crate::models::frame::FeatureFrame;
use crate::models::model::{DeterministicModel, Model, ProbabilisticModel};
use ort::memory::Allocator;
use ort::session::{Session, SessionInputValue};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::borrow::Cow;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// How feature columns are bound to graph inputs
#[derive(Debug, Clone, PartialEq)]
pub enum InputLayout {
    /// One `[1, 1]` input per feature, matched by input name
    PerColumn(Vec<String>),
    /// A single `[1, N]` input; columns follow `order`, or name order when unset
    Packed {
        name: String,
        order: Option<Vec<String>>,
    },
}

/// Tensor data for one graph input
#[derive(Debug, Clone, PartialEq)]
pub struct InputColumn {
    pub name: String,
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

impl InputLayout {
    /// Derive the layout from the graph's declared inputs
    pub fn from_inputs(input_names: Vec<String>, feature_order: &[String]) -> Option<Self> {
        match input_names.len() {
            0 => None,
            1 => {
                let name = input_names.into_iter().next()?;
                let order = if feature_order.is_empty() {
                    None
                } else {
                    Some(feature_order.to_vec())
                };
                Some(InputLayout::Packed { name, order })
            }
            _ => Some(InputLayout::PerColumn(input_names)),
        }
    }

    /// Arrange a frame into the tensors this layout expects
    pub fn columns(&self, frame: &FeatureFrame) -> Result<Vec<InputColumn>> {
        match self {
            InputLayout::PerColumn(names) => {
                let row = frame.values_in(names)?;
                Ok(names
                    .iter()
                    .zip(row)
                    .map(|(name, value)| InputColumn {
                        name: name.clone(),
                        shape: vec![1, 1],
                        data: vec![value as f32],
                    })
                    .collect())
            }
            InputLayout::Packed { name, order } => {
                let row: Vec<f64> = match order {
                    Some(order) => frame.values_in(order)?,
                    None => frame.values().collect(),
                };
                Ok(vec![InputColumn {
                    name: name.clone(),
                    shape: vec![1, row.len() as i64],
                    data: row.into_iter().map(|v| v as f32).collect(),
                }])
            }
        }
    }
}

/// Graph outputs backing each capability
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputNames {
    pub probabilities: Option<String>,
    pub label: Option<String>,
}

impl OutputNames {
    /// Classify graph outputs by name.
    ///
    /// Converted classifiers name them `probabilities`/`output_probability`
    /// and `label`/`output_label`. A lone unrecognized output is read as
    /// probabilities.
    pub fn classify(names: &[String]) -> Self {
        let probabilities = names.iter().find(|n| n.contains("prob")).cloned();
        let label = names.iter().find(|n| n.contains("label")).cloned();

        if probabilities.is_none() && label.is_none() && names.len() == 1 {
            return Self {
                probabilities: names.first().cloned(),
                label: None,
            };
        }

        Self {
            probabilities,
            label,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.probabilities.is_none() && self.label.is_none()
    }
}

/// Loaded ONNX session wrapped as a [`Model`]
pub struct OnnxModel {
    name: String,
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    layout: InputLayout,
    outputs: OutputNames,
}

impl OnnxModel {
    /// Wrap a committed session, resolving inputs and capabilities
    pub fn from_session(
        name: &str,
        path: &Path,
        session: Session,
        feature_order: &[String],
    ) -> Result<Self> {
        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let layout = InputLayout::from_inputs(input_names, feature_order).ok_or_else(|| {
            ServiceError::Load {
                path: path.to_path_buf(),
                reason: "graph declares no inputs".to_string(),
            }
        })?;

        let outputs = OutputNames::classify(&output_names);
        if outputs.is_empty() {
            return Err(ServiceError::Load {
                path: path.to_path_buf(),
                reason: format!(
                    "no probability or label output among {:?}",
                    output_names
                ),
            });
        }

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            layout,
            outputs,
        })
    }

    pub fn layout(&self) -> &InputLayout {
        &self.layout
    }

    pub fn outputs(&self) -> &OutputNames {
        &self.outputs
    }

    /// Run the session on one frame and read a single named output
    fn run<T>(
        &self,
        frame: &FeatureFrame,
        output_name: &str,
        extract: fn(&DynValue) -> Result<T>,
    ) -> Result<T> {
        let mut inputs: Vec<(Cow<'static, str>, SessionInputValue<'static>)> = Vec::new();
        for column in self.layout.columns(frame)? {
            let tensor = Tensor::from_array((column.shape, column.data))
                .map_err(ServiceError::inference)?;
            inputs.push((Cow::Owned(column.name), tensor.into()));
        }

        let mut session = self
            .session
            .lock()
            .map_err(|e| ServiceError::Inference(format!("Lock error: {}", e)))?;

        let outputs = session.run(inputs).map_err(ServiceError::inference)?;
        let output = outputs.get(output_name).ok_or_else(|| {
            ServiceError::Inference(format!("output `{}` missing from run", output_name))
        })?;

        debug!(model = %self.name, output = %output_name, "ONNX session run complete");

        extract(output)
    }
}

impl ProbabilisticModel for OnnxModel {
    fn predict_proba(&self, frame: &FeatureFrame) -> Result<Vec<Vec<f64>>> {
        let output = self.outputs.probabilities.as_deref().ok_or_else(|| {
            ServiceError::Inference("model has no probability output".to_string())
        })?;
        self.run(frame, output, extract_probabilities)
    }
}

impl DeterministicModel for OnnxModel {
    fn predict(&self, frame: &FeatureFrame) -> Result<Vec<i64>> {
        let output = self
            .outputs
            .label
            .as_deref()
            .ok_or_else(|| ServiceError::Inference("model has no label output".to_string()))?;
        self.run(frame, output, extract_labels)
    }
}

impl Model for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn probabilistic(&self) -> Option<&dyn ProbabilisticModel> {
        self.outputs
            .probabilities
            .as_ref()
            .map(|_| self as &dyn ProbabilisticModel)
    }

    fn deterministic(&self) -> Option<&dyn DeterministicModel> {
        self.outputs
            .label
            .as_ref()
            .map(|_| self as &dyn DeterministicModel)
    }
}

/// Read class probabilities from either a `[batch, classes]` tensor or the
/// `seq(map(int64, float))` shape emitted by zipmap-style converters
fn extract_probabilities(output: &DynValue) -> Result<Vec<Vec<f64>>> {
    if let Ok(tensor) = output.try_extract_tensor::<f32>() {
        let (shape, data) = tensor;
        let dims: Vec<i64> = shape.iter().copied().collect();
        return rows_from_tensor(&dims, data.iter().map(|&v| v as f64).collect());
    }

    if let Ok(tensor) = output.try_extract_tensor::<f64>() {
        let (shape, data) = tensor;
        let dims: Vec<i64> = shape.iter().copied().collect();
        return rows_from_tensor(&dims, data.to_vec());
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return rows_from_sequence_map(output);
    }

    Err(ServiceError::Inference(
        "unsupported probability output type".to_string(),
    ))
}

fn rows_from_sequence_map(output: &DynValue) -> Result<Vec<Vec<f64>>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(ServiceError::inference)?;

    // One map per input row
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(ServiceError::inference)?;

    maps.iter()
        .map(|map_value| {
            let pairs = map_value
                .try_extract_key_values::<i64, f32>()
                .map_err(ServiceError::inference)?;
            row_from_class_map(pairs.into_iter().map(|(k, v)| (k, v as f64)).collect())
        })
        .collect()
}

fn extract_labels(output: &DynValue) -> Result<Vec<i64>> {
    if let Ok(tensor) = output.try_extract_tensor::<i64>() {
        let (_, data) = tensor;
        return Ok(data.to_vec());
    }

    Err(ServiceError::Inference(
        "label output is not an int64 tensor".to_string(),
    ))
}

/// Split flat tensor data into probability rows.
///
/// A single-column output is a positive-class score and becomes `[1 - p, p]`.
fn rows_from_tensor(dims: &[i64], data: Vec<f64>) -> Result<Vec<Vec<f64>>> {
    match dims {
        [_, 1] | [1] => Ok(data.into_iter().map(|p| vec![1.0 - p, p]).collect()),
        [_, classes] if *classes > 1 => Ok(data
            .chunks(*classes as usize)
            .map(|row| row.to_vec())
            .collect()),
        [classes] if *classes > 1 => Ok(vec![data]),
        _ => Err(ServiceError::Inference(format!(
            "unexpected probability tensor shape {:?}",
            dims
        ))),
    }
}

/// Order `class label -> probability` pairs by label and keep the
/// probabilities, so the arg-max is a position as with tensor outputs
fn row_from_class_map(mut pairs: Vec<(i64, f64)>) -> Result<Vec<f64>> {
    if pairs.is_empty() {
        return Err(ServiceError::Inference("empty class map".to_string()));
    }

    pairs.sort_by_key(|(class, _)| *class);
    Ok(pairs.into_iter().map(|(_, prob)| prob).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn frame(pairs: &[(&str, f64)]) -> FeatureFrame {
        let features: HashMap<String, f64> =
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        FeatureFrame::from_features(&features).unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_layout_from_inputs() {
        assert_eq!(InputLayout::from_inputs(vec![], &[]), None);

        assert_eq!(
            InputLayout::from_inputs(names(&["float_input"]), &[]),
            Some(InputLayout::Packed {
                name: "float_input".to_string(),
                order: None
            })
        );

        assert_eq!(
            InputLayout::from_inputs(names(&["amount", "merchant_id"]), &[]),
            Some(InputLayout::PerColumn(names(&["amount", "merchant_id"])))
        );
    }

    #[test]
    fn test_per_column_binding_by_name() {
        let layout = InputLayout::PerColumn(names(&["merchant_id", "amount"]));
        let columns = layout
            .columns(&frame(&[("amount", 123.5), ("merchant_id", 42.0)]))
            .unwrap();

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].name, "merchant_id");
        assert_eq!(columns[0].shape, vec![1, 1]);
        assert_eq!(columns[0].data, vec![42.0]);
        assert_eq!(columns[1].name, "amount");
        assert_eq!(columns[1].data, vec![123.5]);
    }

    #[test]
    fn test_packed_layout_orders() {
        let row = frame(&[("b", 2.0), ("a", 1.0), ("c", 3.0)]);

        let by_name = InputLayout::Packed {
            name: "float_input".to_string(),
            order: None,
        };
        let columns = by_name.columns(&row).unwrap();
        assert_eq!(columns[0].shape, vec![1, 3]);
        assert_eq!(columns[0].data, vec![1.0, 2.0, 3.0]);

        let configured = InputLayout::Packed {
            name: "float_input".to_string(),
            order: Some(names(&["c", "a", "b"])),
        };
        let columns = configured.columns(&row).unwrap();
        assert_eq!(columns[0].data, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_missing_column_is_inference_error() {
        let layout = InputLayout::PerColumn(names(&["amount", "merchant_id"]));
        let err = layout.columns(&frame(&[("amount", 1.0)])).unwrap_err();
        assert!(matches!(err, ServiceError::Inference(_)));
    }

    #[test]
    fn test_classify_outputs() {
        let both = OutputNames::classify(&names(&["output_label", "output_probability"]));
        assert_eq!(both.label.as_deref(), Some("output_label"));
        assert_eq!(both.probabilities.as_deref(), Some("output_probability"));

        let label_only = OutputNames::classify(&names(&["label"]));
        assert_eq!(label_only.label.as_deref(), Some("label"));
        assert!(label_only.probabilities.is_none());

        let lone = OutputNames::classify(&names(&["scores"]));
        assert_eq!(lone.probabilities.as_deref(), Some("scores"));

        assert!(OutputNames::classify(&names(&["a", "b"])).is_empty());
    }

    #[test]
    fn test_rows_from_tensor() {
        assert_eq!(
            rows_from_tensor(&[1, 2], vec![0.1, 0.9]).unwrap(),
            vec![vec![0.1, 0.9]]
        );
        assert_eq!(
            rows_from_tensor(&[2, 2], vec![0.1, 0.9, 0.7, 0.3]).unwrap(),
            vec![vec![0.1, 0.9], vec![0.7, 0.3]]
        );
        assert_eq!(
            rows_from_tensor(&[3], vec![0.2, 0.5, 0.3]).unwrap(),
            vec![vec![0.2, 0.5, 0.3]]
        );
        assert!(rows_from_tensor(&[1, 0], vec![]).is_err());
        assert!(rows_from_tensor(&[1, 1, 2], vec![0.5, 0.5]).is_err());
    }

    #[test]
    fn test_single_column_score_expands_to_two_classes() {
        let rows = rows_from_tensor(&[1, 1], vec![0.9]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0][0] - 0.1).abs() < 1e-12);
        assert_eq!(rows[0][1], 0.9);

        let flat = rows_from_tensor(&[1], vec![0.25]).unwrap();
        assert_eq!(flat, vec![vec![0.75, 0.25]]);

        // A fraud score of 0.9 must come back as class 1
        let model = crate::models::inference::tests::StubProba(rows);
        let result = crate::models::inference::predict(
            Some(&model),
            &crate::models::inference::tests::transaction(),
            "v1",
        )
        .unwrap();
        assert_eq!(result.prediction, 1);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn test_row_from_class_map_uses_positions() {
        assert_eq!(
            row_from_class_map(vec![(1, 0.9), (0, 0.1)]).unwrap(),
            vec![0.1, 0.9]
        );
        assert_eq!(
            row_from_class_map(vec![(2, 0.3), (1, 0.7)]).unwrap(),
            vec![0.7, 0.3]
        );
        assert_eq!(
            row_from_class_map(vec![(5, 0.2), (-1, 0.8)]).unwrap(),
            vec![0.8, 0.2]
        );
        assert!(row_from_class_map(vec![]).is_err());
    }
}
