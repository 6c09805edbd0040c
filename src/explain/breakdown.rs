//! Single-instance breakdown and approximate SHAP attribution
//!
//! A breakdown decomposes one prediction into additive per-feature
//! contributions. Starting from the baseline (the mean prediction over a
//! background sample), features are visited in some order and the
//! instance's value is substituted into the background copy one feature
//! at a time; the change in mean prediction is attributed to the feature
//! just visited. Averaging the contributions over many random visiting
//! orders approximates the Shapley values.

use super::{derive_seed, Explainer};
use crate::error::{LanternError, Result};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Seed stream tag for the background row sample
const BACKGROUND_STREAM: u64 = 0xB6;
/// Seed stream tag for visiting-order permutations
const ORDER_STREAM: u64 = 0x0D;

/// How feature visiting orders are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakdownStrategy {
    /// Visit features exactly in the order given by the caller
    FixedOrder,
    /// Average contributions over `n_perm` random visiting orders
    /// (approximate SHAP)
    PermutationAverage,
}

/// Options for a breakdown run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownOptions {
    /// Visiting-order strategy
    pub strategy: BreakdownStrategy,
    /// Number of random orders for `PermutationAverage` (ignored for
    /// `FixedOrder`)
    pub n_perm: usize,
    /// Upper bound on the number of background rows sampled from the
    /// dataset; the dominant cost driver together with `n_perm`
    pub background_cap: usize,
    /// Seed; sub-seeds are derived per permutation index
    pub seed: u64,
}

impl Default for BreakdownOptions {
    fn default() -> Self {
        Self {
            strategy: BreakdownStrategy::FixedOrder,
            n_perm: 20,
            background_cap: 100,
            seed: 0,
        }
    }
}

impl BreakdownOptions {
    /// Set the visiting-order strategy
    pub fn with_strategy(mut self, strategy: BreakdownStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the number of random visiting orders
    pub fn with_n_perm(mut self, n: usize) -> Self {
        self.n_perm = n;
        self
    }

    /// Cap the background sample size
    pub fn with_background_cap(mut self, cap: usize) -> Self {
        self.background_cap = cap;
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Contribution of one feature to one prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    /// Feature name
    pub feature: String,
    /// The instance's value for this feature
    pub value: f64,
    /// Additive contribution to the prediction
    pub contribution: f64,
}

/// Attribution of a single prediction
///
/// When every feature is attributed, satisfies
/// `baseline + sum(contributions) == prediction` up to floating-point
/// tolerance; over a feature subset the residual is the unattributed
/// remainder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownResult {
    /// Mean model prediction over the background sample
    pub baseline: f64,
    /// The model's direct prediction on the full instance
    pub prediction: f64,
    /// Per-feature contributions; visiting order for `FixedOrder`, the
    /// caller's feature order for `PermutationAverage`
    pub contributions: Vec<Contribution>,
    /// Number of background rows actually used
    pub background_size: usize,
}

impl BreakdownResult {
    /// Sum of all contributions
    pub fn sum_contributions(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    /// Contributions sorted by absolute value, descending
    pub fn sorted_by_magnitude(&self) -> Vec<&Contribution> {
        let mut sorted: Vec<&Contribution> = self.contributions.iter().collect();
        sorted.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    /// The `k` largest contributions by magnitude
    pub fn top_k(&self, k: usize) -> Vec<&Contribution> {
        self.sorted_by_magnitude().into_iter().take(k).collect()
    }
}

impl<F> Explainer<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    /// Explain one prediction as additive per-feature contributions
    ///
    /// `instance` must be a full row in the dataset's feature order.
    /// `features` names the features to attribute over: the visiting order
    /// for [`BreakdownStrategy::FixedOrder`], or the permuted set for
    /// [`BreakdownStrategy::PermutationAverage`]. The background sample is
    /// drawn from the explainer's dataset, seeded and capped by
    /// `options.background_cap`.
    pub fn breakdown(
        &self,
        instance: &Array1<f64>,
        features: &[&str],
        options: &BreakdownOptions,
    ) -> Result<BreakdownResult> {
        let columns = self.resolve_features(features)?;
        if instance.len() != self.dataset().n_features() {
            return Err(LanternError::ShapeError {
                expected: format!("instance of length {}", self.dataset().n_features()),
                actual: format!("{}", instance.len()),
            });
        }

        let mut rng =
            ChaCha8Rng::seed_from_u64(derive_seed(options.seed, BACKGROUND_STREAM, 0));
        let background = self.dataset().sample_rows(options.background_cap, &mut rng);
        if background.nrows() == 0 {
            return Err(LanternError::EmptyBackground(
                "background_cap must allow at least one row".to_string(),
            ));
        }

        let baseline = mean(&self.predict(&background)?);
        let prediction = self.predict_one(instance)?;

        debug!(
            n_features = features.len(),
            background_size = background.nrows(),
            strategy = ?options.strategy,
            "computing breakdown attribution"
        );

        let contributions = match options.strategy {
            BreakdownStrategy::FixedOrder => {
                self.walk_order(&background, baseline, instance, &columns)?
            }
            BreakdownStrategy::PermutationAverage => {
                self.average_orders(&background, baseline, instance, &columns, options)?
            }
        };

        let contributions = columns
            .iter()
            .zip(features.iter())
            .zip(contributions)
            .map(|((&column, &feature), contribution)| Contribution {
                feature: feature.to_string(),
                value: instance[column],
                contribution,
            })
            .collect();

        Ok(BreakdownResult {
            baseline,
            prediction,
            contributions,
            background_size: background.nrows(),
        })
    }

    /// One telescoping pass over `order`, returning the contribution of
    /// each visited column, aligned with `order`
    fn walk_order(
        &self,
        background: &Array2<f64>,
        baseline: f64,
        instance: &Array1<f64>,
        order: &[usize],
    ) -> Result<Vec<f64>> {
        let mut working = background.to_owned();
        let mut previous = baseline;
        let mut contributions = Vec::with_capacity(order.len());

        for &column in order {
            working.column_mut(column).fill(instance[column]);
            let current = mean(&self.predict(&working)?);
            contributions.push(current - previous);
            previous = current;
        }
        Ok(contributions)
    }

    /// Average `walk_order` contributions over `n_perm` seeded random
    /// visiting orders; results are aligned with the caller's `columns`
    fn average_orders(
        &self,
        background: &Array2<f64>,
        baseline: f64,
        instance: &Array1<f64>,
        columns: &[usize],
        options: &BreakdownOptions,
    ) -> Result<Vec<f64>> {
        if options.n_perm < 1 {
            return Err(LanternError::InvalidParameter {
                name: "n_perm".to_string(),
                value: options.n_perm.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        // Permutations are independent; each derives its own seed from its
        // index, so the merge below is order-insensitive.
        let totals = (0..options.n_perm)
            .into_par_iter()
            .map(|perm| {
                let cell = derive_seed(options.seed, ORDER_STREAM, perm as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(cell);
                let mut order = columns.to_vec();
                order.shuffle(&mut rng);

                let walked = self.walk_order(background, baseline, instance, &order)?;

                // Re-align contributions from visiting order back to the
                // caller's feature order.
                let mut aligned = vec![0.0; columns.len()];
                for (&column, contribution) in order.iter().zip(walked) {
                    let slot = columns.iter().position(|&c| c == column).unwrap_or(0);
                    aligned[slot] = contribution;
                }
                Ok::<Vec<f64>, LanternError>(aligned)
            })
            .try_reduce(
                || vec![0.0; columns.len()],
                |mut acc, aligned| {
                    for (a, c) in acc.iter_mut().zip(aligned) {
                        *a += c;
                    }
                    Ok(acc)
                },
            )?;

        Ok(totals
            .into_iter()
            .map(|t| t / options.n_perm as f64)
            .collect())
    }
}

fn mean(values: &Array1<f64>) -> f64 {
    values.mean().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use ndarray::array;

    fn scenario() -> Dataset {
        let x = array![[1.0, 10.0], [2.0, 10.0], [3.0, 10.0]];
        let y = array![11.0, 12.0, 13.0];
        let w = array![1.0, 1.0, 1.0];
        Dataset::new(vec!["A".to_string(), "B".to_string()], x, y, w).unwrap()
    }

    fn sum_model(x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.rows().into_iter().map(|r| r[0] + r[1]).collect())
    }

    #[test]
    fn test_fixed_order_additivity() {
        let explainer = Explainer::new(sum_model, scenario());
        let instance = array![2.0, 10.0];
        let options = BreakdownOptions::default().with_background_cap(3);

        let result = explainer.breakdown(&instance, &["A", "B"], &options).unwrap();

        assert_eq!(result.background_size, 3);
        assert!((result.prediction - 12.0).abs() < 1e-12);
        let reconstructed = result.baseline + result.sum_contributions();
        assert!((reconstructed - result.prediction).abs() < 1e-9);

        // For an additive model the contribution of A is its deviation
        // from the background mean: 2 - mean(1,2,3) = 0.
        assert!((result.contributions[0].contribution - 0.0).abs() < 1e-9);
        // B is constant in the background, so it contributes nothing.
        assert!(result.contributions[1].contribution.abs() < 1e-9);
    }

    #[test]
    fn test_permutation_average_additivity_and_determinism() {
        let explainer = Explainer::new(sum_model, scenario());
        let instance = array![3.0, 10.0];
        let options = BreakdownOptions::default()
            .with_strategy(BreakdownStrategy::PermutationAverage)
            .with_n_perm(8)
            .with_background_cap(3)
            .with_seed(11);

        let first = explainer.breakdown(&instance, &["A", "B"], &options).unwrap();
        let second = explainer.breakdown(&instance, &["A", "B"], &options).unwrap();

        let reconstructed = first.baseline + first.sum_contributions();
        assert!((reconstructed - first.prediction).abs() < 1e-9);
        for (a, b) in first.contributions.iter().zip(second.contributions.iter()) {
            assert_eq!(a.contribution, b.contribution);
        }
    }

    #[test]
    fn test_empty_background_rejected() {
        let explainer = Explainer::new(sum_model, scenario());
        let instance = array![1.0, 10.0];
        let options = BreakdownOptions::default().with_background_cap(0);
        let err = explainer
            .breakdown(&instance, &["A"], &options)
            .unwrap_err();
        assert!(matches!(err, LanternError::EmptyBackground(_)));
    }

    #[test]
    fn test_instance_length_checked() {
        let explainer = Explainer::new(sum_model, scenario());
        let short = array![1.0];
        let err = explainer
            .breakdown(&short, &["A"], &BreakdownOptions::default())
            .unwrap_err();
        assert!(matches!(err, LanternError::ShapeError { .. }));
    }

    #[test]
    fn test_top_k_orders_by_magnitude() {
        let result = BreakdownResult {
            baseline: 0.0,
            prediction: 0.5,
            background_size: 1,
            contributions: vec![
                Contribution {
                    feature: "a".to_string(),
                    value: 1.0,
                    contribution: 0.5,
                },
                Contribution {
                    feature: "b".to_string(),
                    value: 2.0,
                    contribution: -2.0,
                },
            ],
        };
        let top = result.top_k(1);
        assert_eq!(top[0].feature, "b");
    }
}
