//! Single-row feature frame handed to models

use crate::error::{Result, ServiceError};
use std::collections::{BTreeMap, HashMap};

/// One row of named feature columns.
///
/// Columns are keyed by name so models can bind them by name rather than
/// by the order the caller happened to send them in.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    columns: BTreeMap<String, f64>,
}

impl FeatureFrame {
    /// Build a frame from a request's feature mapping.
    ///
    /// Rejects empty mappings and non-finite values.
    pub fn from_features(features: &HashMap<String, f64>) -> Result<Self> {
        if features.is_empty() {
            return Err(ServiceError::InvalidInput(
                "feature mapping is empty".to_string(),
            ));
        }

        let mut columns = BTreeMap::new();
        for (name, &value) in features {
            if !value.is_finite() {
                // Name only, never the value
                return Err(ServiceError::InvalidInput(format!(
                    "feature `{}` is not a finite number",
                    name
                )));
            }
            columns.insert(name.clone(), value);
        }

        Ok(Self { columns })
    }

    /// Number of columns in the row
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value of a named column
    pub fn get(&self, name: &str) -> Option<f64> {
        self.columns.get(name).copied()
    }

    /// Column names in lexical order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Row values in lexical column order
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.columns.values().copied()
    }

    /// Row values arranged in an explicit column order.
    ///
    /// Every listed column must be present and no extra columns are allowed.
    pub fn values_in(&self, order: &[String]) -> Result<Vec<f64>> {
        let mut row = Vec::with_capacity(order.len());
        for name in order {
            let value = self.get(name).ok_or_else(|| {
                ServiceError::Inference(format!("missing feature column `{}`", name))
            })?;
            row.push(value);
        }

        if let Some(extra) = self.names().find(|n| !order.iter().any(|o| o.as_str() == *n)) {
            return Err(ServiceError::Inference(format!(
                "unexpected feature column `{}`",
                extra
            )));
        }

        Ok(row)
    }
}
