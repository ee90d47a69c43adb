use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A linear regression exported to JSON together with its standard-score
/// transform. The artifact is produced offline; the engine only consumes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearModel {
    pub version: u32,
    pub feature_count: usize,
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl LinearModel {
    /// Loads and schema-validates an artifact. Any failure yields `None`
    /// so callers fall back to the deterministic formula.
    pub fn load(path: &Path) -> Option<LinearModel> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), "model artifact not readable: {e}");
                return None;
            }
        };

        let model: LinearModel = match serde_json::from_str(&raw) {
            Ok(model) => model,
            Err(e) => {
                warn!(path = %path.display(), "model artifact not parseable: {e}");
                return None;
            }
        };

        if !model.is_valid() {
            warn!(path = %path.display(), "model artifact failed schema validation");
            return None;
        }

        info!(
            path = %path.display(),
            features = model.feature_count,
            version = model.version,
            "model artifact loaded"
        );
        Some(model)
    }

    pub fn is_valid(&self) -> bool {
        self.feature_count > 0
            && self.weights.len() == self.feature_count
            && self.mean.len() == self.feature_count
            && self.std.len() == self.feature_count
            && self.std.iter().all(|s| s.is_finite() && *s != 0.0)
            && self.weights.iter().all(|w| w.is_finite())
    }

    /// Standard-score transform followed by the dot product.
    pub fn predict(&self, features: &[f64]) -> Option<f64> {
        if features.len() != self.feature_count {
            return None;
        }

        let mut sum = self.intercept;
        for i in 0..self.feature_count {
            let scaled = (features[i] - self.mean[i]) / self.std[i];
            sum += scaled * self.weights[i];
        }
        Some(sum)
    }
}
