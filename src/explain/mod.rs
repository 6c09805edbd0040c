//! Model-agnostic interpretation methods
//!
//! The [`Explainer`] wraps one fitted model (a batched prediction closure)
//! and one reference [`Dataset`] and exposes:
//! - permutation feature importance
//! - single-instance breakdown / approximate SHAP attribution
//! - partial dependence, ICE, and accumulated local effects
//! - pairwise interaction strength (H-statistic)
//!
//! Any model type is supported by providing a conforming prediction
//! closure; no trait hierarchy over model internals is required.

mod breakdown;
mod effects;
mod importance;

pub use breakdown::{BreakdownOptions, BreakdownResult, BreakdownStrategy, Contribution};
pub use effects::{AleResult, EffectsOptions, IceResult, PartialDependenceResult};
pub use importance::{FeatureImportance, ImportanceOptions, ImportanceResult};

use crate::dataset::Dataset;
use crate::error::{LanternError, Result};
use ndarray::{Array1, Array2};

/// Uniform interpretation interface over one model and one dataset
///
/// The prediction closure takes a batch of rows (in the dataset's feature
/// order) and must be pure: repeated calls on the same rows return the
/// same values. Both the model and the dataset are immutable once the
/// explainer is built.
pub struct Explainer<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    predict_fn: F,
    dataset: Dataset,
}

impl<F> Explainer<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    /// Create an explainer over a prediction closure and a reference dataset
    pub fn new(predict_fn: F, dataset: Dataset) -> Self {
        Self {
            predict_fn,
            dataset,
        }
    }

    /// The wrapped reference dataset
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Score a batch of rows through the wrapped model
    ///
    /// All interpretation paths go through this single point so that
    /// non-finite model output is caught everywhere, never silently
    /// aggregated.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.dataset.n_features() {
            return Err(LanternError::ShapeError {
                expected: format!("{} feature columns", self.dataset.n_features()),
                actual: format!("{}", x.ncols()),
            });
        }
        let preds = (self.predict_fn)(x)?;
        if preds.len() != x.nrows() {
            return Err(LanternError::ShapeError {
                expected: format!("{} predictions", x.nrows()),
                actual: format!("{}", preds.len()),
            });
        }
        if preds.iter().any(|p| !p.is_finite()) {
            return Err(LanternError::ComputationError(
                "model returned a non-finite prediction".to_string(),
            ));
        }
        Ok(preds)
    }

    /// Score a single row
    pub(crate) fn predict_one(&self, row: &Array1<f64>) -> Result<f64> {
        let batch = row.clone().insert_axis(ndarray::Axis(0));
        Ok(self.predict(&batch)?[0])
    }

    /// Resolve feature names to column indices, failing on the first miss
    pub(crate) fn resolve_features(&self, features: &[&str]) -> Result<Vec<usize>> {
        if features.is_empty() {
            return Err(LanternError::InvalidParameter {
                name: "features".to_string(),
                value: "[]".to_string(),
                reason: "at least one feature is required".to_string(),
            });
        }
        features
            .iter()
            .map(|f| self.dataset.feature_index(f))
            .collect()
    }
}

/// Deterministic sub-seed for one (stream, index) cell of a randomized run
///
/// Splitmix64-style mixing so that parallel execution order and call order
/// never affect which random stream a cell sees.
pub(crate) fn derive_seed(seed: u64, stream: u64, index: u64) -> u64 {
    let mut z = seed
        .wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(index.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
