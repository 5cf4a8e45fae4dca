//! Bias + PCA projection applied to stored vectors before similarity.

use serde::{Deserialize, Serialize};

use crate::simd::{dot, normalize_in_place};

/// `normalize(components · (v + bias - mean))`; every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<Vec<f32>>,
    /// PCA matrix, one row per output dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Vec<f32>>>,
}

impl Projection {
    /// Checks every part against the input dimensionality.
    pub fn validate(&self, input_dim: usize) -> Result<(), String> {
        if let Some(bias) = &self.bias {
            if bias.len() != input_dim {
                return Err(format!("bias has {} values, expected {input_dim}", bias.len()));
            }
        }
        if let Some(mean) = &self.mean {
            if mean.len() != input_dim {
                return Err(format!("mean has {} values, expected {input_dim}", mean.len()));
            }
        }
        if let Some(components) = &self.components {
            if components.is_empty() {
                return Err("projection matrix has no rows".to_string());
            }
            if let Some(row) = components.iter().position(|r| r.len() != input_dim) {
                return Err(format!("projection row {row} does not have {input_dim} columns"));
            }
        }
        let values = self
            .bias
            .iter()
            .chain(self.mean.iter())
            .chain(self.components.iter().flatten());
        for part in values {
            if part.iter().any(|v| !v.is_finite()) {
                return Err("projection contains non-finite values".to_string());
            }
        }
        Ok(())
    }

    /// Rows of the PCA matrix, `None` without one.
    #[must_use]
    pub fn reduced_dim(&self) -> Option<usize> {
        self.components.as_ref().map(Vec::len)
    }

    /// Output dimensionality for inputs of `input_dim` values.
    #[must_use]
    pub fn output_dim_for(&self, input_dim: usize) -> usize {
        self.reduced_dim().unwrap_or(input_dim)
    }

    #[must_use]
    pub fn apply(&self, input: &[f32]) -> Vec<f32> {
        let mut centered = input.to_vec();
        if let Some(bias) = &self.bias {
            for (x, b) in centered.iter_mut().zip(bias) {
                *x += b;
            }
        }
        if let Some(mean) = &self.mean {
            for (x, m) in centered.iter_mut().zip(mean) {
                *x -= m;
            }
        }
        let mut out = match &self.components {
            Some(rows) => rows.iter().map(|row| dot(row, &centered)).collect(),
            None => centered,
        };
        normalize_in_place(&mut out);
        out
    }
}
