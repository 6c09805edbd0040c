//! Lantern - post-hoc model interpretability
//!
//! Wraps one fitted predictive model (any batched prediction closure) and
//! a reference dataset behind a uniform [`Explainer`](explain::Explainer)
//! interface:
//!
//! - [`explain`] - permutation importance, breakdown / approximate SHAP
//!   attribution, partial dependence, ICE, accumulated local effects, and
//!   pairwise interaction strength
//! - [`dataset`] - the read-only tabular collaborator: named features,
//!   response, case weights (exposure), polars DataFrame ingestion
//! - [`metrics`] - weighted performance metrics driving importance
//! - [`error`] - error taxonomy shared across the crate
//!
//! Model training is out of scope: a model participates purely through a
//! `Fn(&Array2<f64>) -> Result<Array1<f64>>` closure, assumed pure and
//! deterministic. All randomized operations take an explicit seed and
//! derive sub-seeds per cell, so results are reproducible regardless of
//! execution order or parallel scheduling.

pub mod dataset;
pub mod error;
pub mod explain;
pub mod metrics;

pub use dataset::Dataset;
pub use error::{LanternError, Result};
pub use explain::{
    AleResult, BreakdownOptions, BreakdownResult, BreakdownStrategy, Contribution,
    EffectsOptions, Explainer, FeatureImportance, IceResult, ImportanceOptions,
    ImportanceResult, PartialDependenceResult,
};
pub use metrics::{MeanAbsoluteError, MeanSquaredError, Metric, PoissonDeviance};
