//! Weighted performance metrics
//!
//! Metrics drive permutation importance: smaller is better, and the
//! importance of a feature is the increase in metric value after its
//! column is shuffled. All metrics are exposure-weighted since actuarial
//! frequency data carries per-row exposure.

use crate::error::{LanternError, Result};
use ndarray::Array1;

/// A performance metric, monotonically better for smaller values
pub trait Metric {
    /// Short name used in logs and reports
    fn name(&self) -> &'static str;

    /// Weighted loss of predictions against observed responses
    fn evaluate(
        &self,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<f64>;
}

/// Weighted mean squared error
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

/// Weighted mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAbsoluteError;

/// Weighted mean Poisson deviance
///
/// The canonical loss for claims-frequency models. Requires strictly
/// positive predictions; zero observed counts contribute `2 * mu`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonDeviance;

fn check_inputs(
    metric: &str,
    y_true: &Array1<f64>,
    y_pred: &Array1<f64>,
    weights: &Array1<f64>,
) -> Result<f64> {
    if y_true.len() != y_pred.len() || y_true.len() != weights.len() {
        return Err(LanternError::ShapeError {
            expected: format!("{} predictions and weights", y_true.len()),
            actual: format!("{} and {}", y_pred.len(), weights.len()),
        });
    }
    let total_weight = weights.sum();
    if total_weight <= 0.0 {
        return Err(LanternError::InvalidParameter {
            name: "weights".to_string(),
            value: total_weight.to_string(),
            reason: format!("{} requires positive total weight", metric),
        });
    }
    Ok(total_weight)
}

fn finalize(metric: &str, loss: f64) -> Result<f64> {
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(LanternError::ComputationError(format!(
            "{} evaluated to a non-finite value",
            metric
        )))
    }
}

impl Metric for MeanSquaredError {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn evaluate(
        &self,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<f64> {
        let total = check_inputs(self.name(), y_true, y_pred, weights)?;
        let sum: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .zip(weights.iter())
            .map(|((t, p), w)| w * (t - p).powi(2))
            .sum();
        finalize(self.name(), sum / total)
    }
}

impl Metric for MeanAbsoluteError {
    fn name(&self) -> &'static str {
        "mae"
    }

    fn evaluate(
        &self,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<f64> {
        let total = check_inputs(self.name(), y_true, y_pred, weights)?;
        let sum: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .zip(weights.iter())
            .map(|((t, p), w)| w * (t - p).abs())
            .sum();
        finalize(self.name(), sum / total)
    }
}

impl Metric for PoissonDeviance {
    fn name(&self) -> &'static str {
        "poisson_deviance"
    }

    fn evaluate(
        &self,
        y_true: &Array1<f64>,
        y_pred: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<f64> {
        let total = check_inputs(self.name(), y_true, y_pred, weights)?;

        let mut sum = 0.0;
        for ((t, p), w) in y_true.iter().zip(y_pred.iter()).zip(weights.iter()) {
            if *p <= 0.0 {
                return Err(LanternError::ComputationError(format!(
                    "{} requires strictly positive predictions, got {}",
                    self.name(),
                    p
                )));
            }
            // Unit deviance: 2 * (y * ln(y / mu) - (y - mu)), with the
            // y = 0 limit 2 * mu.
            let dev = if *t > 0.0 {
                2.0 * (t * (t / p).ln() - (t - p))
            } else {
                2.0 * p
            };
            sum += w * dev;
        }
        finalize(self.name(), sum / total)
    }
}
