//! Global effect curves: partial dependence, ICE, accumulated local
//! effects, and pairwise interaction strength
//!
//! Partial dependence sweeps one feature over a grid while every other
//! feature keeps its observed value; ICE keeps the per-row curves instead
//! of averaging them. Accumulated local effects estimate the same shape
//! from within-bin prediction differences, which stays honest when
//! features are correlated.

use super::Explainer;
use crate::error::{LanternError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Grid construction options shared by the effect curves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsOptions {
    /// Number of grid points for PDP/ICE
    pub n_grid_points: usize,
    /// Percentile range the grid is clamped to, guarding against outliers
    pub percentile_range: (f64, f64),
}

impl Default for EffectsOptions {
    fn default() -> Self {
        Self {
            n_grid_points: 20,
            percentile_range: (5.0, 95.0),
        }
    }
}

impl EffectsOptions {
    /// Set the number of grid points (at least 2)
    pub fn with_grid_points(mut self, n: usize) -> Self {
        self.n_grid_points = n.max(2);
        self
    }

    /// Set the percentile range for the grid
    pub fn with_percentile_range(mut self, low: f64, high: f64) -> Self {
        self.percentile_range = (low.clamp(0.0, 100.0), high.clamp(0.0, 100.0));
        self
    }
}

/// Partial dependence of the model on one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDependenceResult {
    /// Feature name
    pub feature: String,
    /// Grid values the feature was swept over
    pub grid: Vec<f64>,
    /// Exposure-weighted average prediction at each grid value
    pub average_predictions: Vec<f64>,
    /// Exposure-weighted standard deviation at each grid value
    pub std_predictions: Vec<f64>,
}

/// Individual conditional expectation curves for one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceResult {
    /// Feature name
    pub feature: String,
    /// Grid values the feature was swept over
    pub grid: Vec<f64>,
    /// One prediction curve per dataset row, shape (n_rows, n_grid)
    pub curves: Vec<Vec<f64>>,
    /// Whether curves were centered at the first grid value
    pub centered: bool,
}

/// Accumulated local effects of one feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AleResult {
    /// Feature name
    pub feature: String,
    /// Quantile bin edges; effects are evaluated at these points
    pub bin_edges: Vec<f64>,
    /// Centered accumulated effect at each bin edge
    pub effects: Vec<f64>,
}

impl<F> Explainer<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Sync,
{
    /// Partial dependence curve for one feature
    pub fn partial_dependence(
        &self,
        feature: &str,
        options: &EffectsOptions,
    ) -> Result<PartialDependenceResult> {
        let column = self.dataset().feature_index(feature)?;
        let grid = self.grid_for(column, options);

        let weights = self.dataset().weights();
        let total_weight = weights.sum();
        let mut average = Vec::with_capacity(grid.len());
        let mut std = Vec::with_capacity(grid.len());

        for &value in &grid {
            let preds = self.predict_at(column, value)?;
            let mean = preds
                .iter()
                .zip(weights.iter())
                .map(|(p, w)| p * w)
                .sum::<f64>()
                / total_weight;
            let variance = preds
                .iter()
                .zip(weights.iter())
                .map(|(p, w)| w * (p - mean).powi(2))
                .sum::<f64>()
                / total_weight;
            average.push(mean);
            std.push(variance.sqrt());
        }

        Ok(PartialDependenceResult {
            feature: feature.to_string(),
            grid,
            average_predictions: average,
            std_predictions: std,
        })
    }

    /// ICE curves for one feature, optionally centered at the first grid
    /// value
    pub fn ice(
        &self,
        feature: &str,
        options: &EffectsOptions,
        centered: bool,
    ) -> Result<IceResult> {
        let column = self.dataset().feature_index(feature)?;
        let grid = self.grid_for(column, options);
        let n_rows = self.dataset().n_rows();

        let mut curves = vec![Vec::with_capacity(grid.len()); n_rows];
        for &value in &grid {
            let preds = self.predict_at(column, value)?;
            for (row, pred) in preds.iter().enumerate() {
                curves[row].push(*pred);
            }
        }

        if centered {
            for curve in &mut curves {
                let anchor = curve[0];
                for p in curve.iter_mut() {
                    *p -= anchor;
                }
            }
        }

        Ok(IceResult {
            feature: feature.to_string(),
            grid,
            curves,
            centered,
        })
    }

    /// Accumulated local effects of one feature over `n_bins` quantile bins
    ///
    /// Within each bin, rows are scored at the bin's upper and lower edge
    /// and the weighted mean difference taken as the local effect; the
    /// accumulated curve is centered to zero weighted mean. A constant
    /// feature yields a single edge with zero effect.
    pub fn accumulated_local_effects(&self, feature: &str, n_bins: usize) -> Result<AleResult> {
        let column = self.dataset().feature_index(feature)?;
        if n_bins < 1 {
            return Err(LanternError::InvalidParameter {
                name: "n_bins".to_string(),
                value: n_bins.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let x = self.dataset().x();
        let weights = self.dataset().weights();
        let mut sorted: Vec<f64> = x.column(column).to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        // Quantile edges, deduplicated so ties collapse into wider bins.
        let mut edges: Vec<f64> = (0..=n_bins)
            .map(|k| sorted[(k * (sorted.len() - 1)) / n_bins])
            .collect();
        edges.dedup();

        if edges.len() < 2 {
            return Ok(AleResult {
                feature: feature.to_string(),
                bin_edges: edges,
                effects: vec![0.0],
            });
        }

        // Local effect per bin: weighted mean prediction difference when
        // the rows falling in the bin are moved to its upper versus lower
        // edge.
        let mut local_effects = Vec::with_capacity(edges.len() - 1);
        let mut bin_weights = Vec::with_capacity(edges.len() - 1);
        for (bin, window) in edges.windows(2).enumerate() {
            let (lower, upper) = (window[0], window[1]);
            let rows: Vec<usize> = (0..x.nrows())
                .filter(|&i| {
                    let v = x[[i, column]];
                    if bin == 0 {
                        v >= lower && v <= upper
                    } else {
                        v > lower && v <= upper
                    }
                })
                .collect();

            if rows.is_empty() {
                local_effects.push(0.0);
                bin_weights.push(0.0);
                continue;
            }

            let subset = Array2::from_shape_fn((rows.len(), x.ncols()), |(i, j)| {
                x[[rows[i], j]]
            });
            let mut at_upper = subset.clone();
            at_upper.column_mut(column).fill(upper);
            let mut at_lower = subset;
            at_lower.column_mut(column).fill(lower);

            let upper_preds = self.predict(&at_upper)?;
            let lower_preds = self.predict(&at_lower)?;

            let w_bin: f64 = rows.iter().map(|&i| weights[i]).sum();
            let diff: f64 = rows
                .iter()
                .enumerate()
                .map(|(k, &i)| weights[i] * (upper_preds[k] - lower_preds[k]))
                .sum::<f64>()
                / w_bin;

            local_effects.push(diff);
            bin_weights.push(w_bin);
        }

        // Accumulate, then center by the weighted mean of the mid-bin
        // accumulated values so the curve reads as deviation from the
        // average effect.
        let mut accumulated = vec![0.0];
        for effect in &local_effects {
            let last = *accumulated.last().unwrap_or(&0.0);
            accumulated.push(last + effect);
        }

        let total_weight: f64 = bin_weights.iter().sum();
        let center = if total_weight > 0.0 {
            local_effects
                .iter()
                .enumerate()
                .map(|(bin, _)| {
                    bin_weights[bin] * (accumulated[bin] + accumulated[bin + 1]) / 2.0
                })
                .sum::<f64>()
                / total_weight
        } else {
            0.0
        };

        let effects = accumulated.into_iter().map(|a| a - center).collect();

        Ok(AleResult {
            feature: feature.to_string(),
            bin_edges: edges,
            effects,
        })
    }

    /// Friedman's H²-statistic for one feature pair
    ///
    /// Fraction of the 2-D partial-dependence variance not explained by
    /// the additive combination of the two 1-D curves; 0 means no
    /// interaction, values toward 1 mean the pair's joint effect dominates.
    pub fn interaction_strength(
        &self,
        feature_a: &str,
        feature_b: &str,
        options: &EffectsOptions,
    ) -> Result<f64> {
        let col_a = self.dataset().feature_index(feature_a)?;
        let col_b = self.dataset().feature_index(feature_b)?;
        let grid_a = self.grid_for(col_a, options);
        let grid_b = self.grid_for(col_b, options);

        let pd_a = self.pd_over_grid(col_a, &grid_a)?;
        let pd_b = self.pd_over_grid(col_b, &grid_b)?;

        // Joint partial dependence over the 2-D grid.
        let mut joint = vec![vec![0.0; grid_b.len()]; grid_a.len()];
        let weights = self.dataset().weights();
        let total_weight = weights.sum();
        for (i, &value_a) in grid_a.iter().enumerate() {
            for (j, &value_b) in grid_b.iter().enumerate() {
                let mut modified = self.dataset().x().clone();
                modified.column_mut(col_a).fill(value_a);
                modified.column_mut(col_b).fill(value_b);
                let preds = self.predict(&modified)?;
                joint[i][j] = preds
                    .iter()
                    .zip(weights.iter())
                    .map(|(p, w)| p * w)
                    .sum::<f64>()
                    / total_weight;
            }
        }

        let n_cells = (grid_a.len() * grid_b.len()) as f64;
        let joint_mean = joint.iter().flatten().sum::<f64>() / n_cells;

        let mut ss_residual = 0.0;
        let mut ss_total = 0.0;
        for (i, row) in joint.iter().enumerate() {
            for (j, &pred) in row.iter().enumerate() {
                let additive = pd_a[i] + pd_b[j] - joint_mean;
                ss_residual += (pred - additive).powi(2);
                ss_total += (pred - joint_mean).powi(2);
            }
        }

        if ss_total > 0.0 {
            Ok(ss_residual / ss_total)
        } else {
            Ok(0.0)
        }
    }

    /// Weighted mean prediction with one column held at each grid value
    fn pd_over_grid(&self, column: usize, grid: &[f64]) -> Result<Vec<f64>> {
        let weights = self.dataset().weights();
        let total_weight = weights.sum();
        grid.iter()
            .map(|&value| {
                let preds = self.predict_at(column, value)?;
                Ok(preds
                    .iter()
                    .zip(weights.iter())
                    .map(|(p, w)| p * w)
                    .sum::<f64>()
                    / total_weight)
            })
            .collect()
    }

    /// Predictions over the dataset with one column held at `value`
    fn predict_at(&self, column: usize, value: f64) -> Result<Array1<f64>> {
        let mut modified = self.dataset().x().clone();
        modified.column_mut(column).fill(value);
        self.predict(&modified)
    }

    /// Evenly spaced grid between the clamped percentiles of a column
    fn grid_for(&self, column: usize, options: &EffectsOptions) -> Vec<f64> {
        let mut values: Vec<f64> = self.dataset().x().column(column).to_vec();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = values.len();
        let (low_pct, high_pct) = options.percentile_range;
        let low = values[((low_pct / 100.0) * (n - 1) as f64) as usize];
        let high = values[((high_pct / 100.0) * (n - 1) as f64) as usize];

        if high <= low {
            return vec![low];
        }
        let n_points = options.n_grid_points.max(2);
        let step = (high - low) / (n_points - 1) as f64;
        (0..n_points).map(|i| low + i as f64 * step).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use ndarray::array;

    fn dataset() -> Dataset {
        let x = array![
            [0.0, 1.0],
            [1.0, 2.0],
            [2.0, 3.0],
            [3.0, 4.0],
            [4.0, 5.0],
            [5.0, 6.0]
        ];
        let y = array![2.0, 5.0, 8.0, 11.0, 14.0, 17.0];
        let w = array![1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        Dataset::new(vec!["x0".to_string(), "x1".to_string()], x, y, w).unwrap()
    }

    fn additive_model(x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.rows().into_iter().map(|r| r[0] + 2.0 * r[1]).collect())
    }

    fn multiplicative_model(x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(x.rows().into_iter().map(|r| r[0] * r[1]).collect())
    }

    #[test]
    fn test_pdp_is_linear_for_linear_model() {
        let explainer = Explainer::new(additive_model, dataset());
        let options = EffectsOptions::default()
            .with_grid_points(5)
            .with_percentile_range(0.0, 100.0);
        let pdp = explainer.partial_dependence("x0", &options).unwrap();

        assert_eq!(pdp.grid.len(), 5);
        // Sweeping x0 shifts the average prediction one-for-one.
        let slope = (pdp.average_predictions[4] - pdp.average_predictions[0])
            / (pdp.grid[4] - pdp.grid[0]);
        assert!((slope - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ice_centering() {
        let explainer = Explainer::new(additive_model, dataset());
        let options = EffectsOptions::default()
            .with_grid_points(4)
            .with_percentile_range(0.0, 100.0);
        let ice = explainer.ice("x0", &options, true).unwrap();

        assert_eq!(ice.curves.len(), 6);
        for curve in &ice.curves {
            assert_eq!(curve[0], 0.0);
        }
    }

    #[test]
    fn test_ale_recovers_linear_slope() {
        let explainer = Explainer::new(additive_model, dataset());
        let ale = explainer.accumulated_local_effects("x1", 3).unwrap();

        // Effect differences between consecutive edges follow the model's
        // coefficient for x1.
        for window in ale.bin_edges.windows(2).zip(ale.effects.windows(2)) {
            let (edges, effects) = window;
            let slope = (effects[1] - effects[0]) / (edges[1] - edges[0]);
            assert!((slope - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ale_constant_feature() {
        let x = array![[1.0, 7.0], [2.0, 7.0], [3.0, 7.0]];
        let y = array![15.0, 16.0, 17.0];
        let w = array![1.0, 1.0, 1.0];
        let ds = Dataset::new(vec!["a".to_string(), "b".to_string()], x, y, w).unwrap();
        let explainer = Explainer::new(additive_model, ds);

        let ale = explainer.accumulated_local_effects("b", 4).unwrap();
        assert_eq!(ale.effects, vec![0.0]);
    }

    #[test]
    fn test_interaction_strength() {
        let options = EffectsOptions::default()
            .with_grid_points(5)
            .with_percentile_range(0.0, 100.0);

        let additive = Explainer::new(additive_model, dataset());
        let h_additive = additive.interaction_strength("x0", "x1", &options).unwrap();
        assert!(h_additive.abs() < 1e-9);

        let interacting = Explainer::new(multiplicative_model, dataset());
        let h_interacting = interacting
            .interaction_strength("x0", "x1", &options)
            .unwrap();
        assert!(h_interacting > h_additive);
    }
}
