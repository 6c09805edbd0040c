//! Permutation feature importance
//!
//! Importance of a feature is the mean increase in a performance metric
//! when that feature's column is shuffled across rows, breaking its
//! association with the response while preserving its marginal
//! distribution.

use super::{derive_seed, Explainer};
use crate::error::{LanternError, Result};
use crate::metrics::Metric;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Seed stream tag for (feature, repeat) shuffle cells
const SHUFFLE_STREAM: u64 = 0x5048;

/// Options for a permutation-importance run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceOptions {
    /// Number of independent shuffles per feature
    pub n_repeats: usize,
    /// Seed; sub-seeds are derived per (feature, repeat)
    pub seed: u64,
}

impl Default for ImportanceOptions {
    fn default() -> Self {
        Self {
            n_repeats: 5,
            seed: 0,
        }
    }
}

impl ImportanceOptions {
    /// Set the number of repeats (at least 1)
    pub fn with_n_repeats(mut self, n: usize) -> Self {
        self.n_repeats = n;
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Importance of a single feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Feature name
    pub feature: String,
    /// Mean loss increase over repeats (more positive = more important)
    pub mean_loss_increase: f64,
    /// Standard deviation of the loss increase over repeats
    pub std_loss_increase: f64,
}

/// Result of a permutation-importance run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceResult {
    /// Metric that was degraded
    pub metric: String,
    /// Loss on the unmodified dataset
    pub baseline_loss: f64,
    /// Number of shuffles per feature
    pub n_repeats: usize,
    /// Per-feature importances, descending by mean, ties broken by name
    pub importances: Vec<FeatureImportance>,
}

impl ImportanceResult {
    /// Mean loss increase for one feature, if it was evaluated
    pub fn get(&self, feature: &str) -> Option<f64> {
        self.importances
            .iter()
            .find(|fi| fi.feature == feature)
            .map(|fi| fi.mean_loss_increase)
    }

    /// The `k` most important features
    pub fn top_k(&self, k: usize) -> &[FeatureImportance] {
        &self.importances[..k.min(self.importances.len())]
    }
}

impl<F> Explainer<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    /// Permutation importance of `features` under `metric`
    ///
    /// For every feature, `n_repeats` fresh column-shuffled copies of the
    /// feature matrix are rescored and the loss increase over the baseline
    /// recorded. The shared dataset is never modified. A constant column
    /// shuffles to itself and reports an importance of roughly zero; this
    /// is a valid answer, not an error.
    pub fn permutation_importance<M: Metric + Sync>(
        &self,
        features: &[&str],
        metric: &M,
        options: &ImportanceOptions,
    ) -> Result<ImportanceResult> {
        self.resolve_features(features)?;
        if options.n_repeats < 1 {
            return Err(LanternError::InvalidParameter {
                name: "n_repeats".to_string(),
                value: options.n_repeats.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let dataset = self.dataset();
        let baseline_preds = self.predict(dataset.x())?;
        let baseline_loss = metric.evaluate(dataset.y(), &baseline_preds, dataset.weights())?;

        debug!(
            n_features = features.len(),
            n_repeats = options.n_repeats,
            metric = metric.name(),
            baseline_loss,
            "computing permutation importance"
        );

        // Cells are independent; each one derives its own seed from the
        // feature's column index and the repeat number, so parallel
        // scheduling cannot change the result.
        let mut importances: Vec<FeatureImportance> = features
            .par_iter()
            .map(|&feature| {
                let column = dataset.feature_index(feature)?;
                let mut deltas = Vec::with_capacity(options.n_repeats);
                for repeat in 0..options.n_repeats {
                    let cell = derive_seed(options.seed, SHUFFLE_STREAM, pack(column, repeat));
                    let mut rng = ChaCha8Rng::seed_from_u64(cell);
                    let shuffled = dataset.shuffled_copy(feature, &mut rng)?;
                    let preds = self.predict(&shuffled)?;
                    let loss = metric.evaluate(dataset.y(), &preds, dataset.weights())?;
                    deltas.push(loss - baseline_loss);
                }

                let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
                let variance = deltas
                    .iter()
                    .map(|d| (d - mean).powi(2))
                    .sum::<f64>()
                    / deltas.len() as f64;

                Ok(FeatureImportance {
                    feature: feature.to_string(),
                    mean_loss_increase: mean,
                    std_loss_increase: variance.sqrt(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        importances.sort_by(|a, b| {
            b.mean_loss_increase
                .partial_cmp(&a.mean_loss_increase)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.feature.cmp(&b.feature))
        });

        Ok(ImportanceResult {
            metric: metric.name().to_string(),
            baseline_loss,
            n_repeats: options.n_repeats,
            importances,
        })
    }
}

/// Pack a (column, repeat) cell into one index for seed derivation
fn pack(column: usize, repeat: usize) -> u64 {
    ((column as u64) << 32) | repeat as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::metrics::MeanSquaredError;
    use ndarray::array;

    fn scenario() -> Dataset {
        // A varies, B is constant; the model below is A + B.
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0]];
        let y = array![11.0, 12.0, 13.0];
        let w = array![1.0, 1.0, 1.0];
        Dataset::new(vec!["A".to_string(), "B".to_string()], x, y, w).unwrap()
    }

    fn sum_model(x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.rows().into_iter().map(|r| r[0] + r[1]).collect())
    }

    #[test]
    fn test_constant_feature_has_zero_importance() {
        let explainer = Explainer::new(sum_model, scenario());
        let options = ImportanceOptions::default().with_n_repeats(5).with_seed(0);
        let result = explainer
            .permutation_importance(&["A", "B"], &MeanSquaredError, &options)
            .unwrap();

        assert!(result.get("B").unwrap().abs() < 1e-12);
        assert!(result.get("A").unwrap() > 0.0);
        // Descending order puts the informative feature first.
        assert_eq!(result.importances[0].feature, "A");
    }

    #[test]
    fn test_same_seed_same_result() {
        let explainer = Explainer::new(sum_model, scenario());
        let options = ImportanceOptions::default().with_n_repeats(3).with_seed(9);
        let a = explainer
            .permutation_importance(&["A"], &MeanSquaredError, &options)
            .unwrap();
        let b = explainer
            .permutation_importance(&["A"], &MeanSquaredError, &options)
            .unwrap();
        assert_eq!(a.get("A"), b.get("A"));
    }

    #[test]
    fn test_ties_broken_by_name() {
        // Two constant features tie at zero importance.
        let x = array![[5.0, 5.0], [5.0, 5.0]];
        let y = array![10.0, 10.0];
        let w = array![1.0, 1.0];
        let ds = Dataset::new(vec!["Zeta".to_string(), "Alpha".to_string()], x, y, w).unwrap();
        let explainer = Explainer::new(sum_model, ds);

        let result = explainer
            .permutation_importance(
                &["Zeta", "Alpha"],
                &MeanSquaredError,
                &ImportanceOptions::default(),
            )
            .unwrap();
        assert_eq!(result.importances[0].feature, "Alpha");
        assert_eq!(result.importances[1].feature, "Zeta");
    }

    #[test]
    fn test_zero_repeats_rejected() {
        let explainer = Explainer::new(sum_model, scenario());
        let options = ImportanceOptions::default().with_n_repeats(0);
        let err = explainer
            .permutation_importance(&["A"], &MeanSquaredError, &options)
            .unwrap_err();
        assert!(matches!(err, LanternError::InvalidParameter { .. }));
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let explainer = Explainer::new(sum_model, scenario());
        let err = explainer
            .permutation_importance(&["C"], &MeanSquaredError, &ImportanceOptions::default())
            .unwrap_err();
        assert!(matches!(err, LanternError::FeatureNotFound(_)));
    }
}
