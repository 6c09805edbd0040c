//! Reference dataset: named feature columns, response, and case weights
//!
//! A [`Dataset`] is the read-only data collaborator shared by every
//! interpretation operation. Randomized operations never modify it in
//! place; they work on fresh copies produced by [`Dataset::shuffled_copy`]
//! and [`Dataset::sample_rows`].

use crate::error::{LanternError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::prelude::*;

/// Immutable tabular dataset backing an explainer
///
/// Features are held as a dense `f64` matrix; string columns are
/// label-encoded on ingestion and their level tables retained so codes
/// stay interpretable. The response is the observed target (e.g. claim
/// frequency) and weights carry per-row exposure.
#[derive(Debug, Clone)]
pub struct Dataset {
    feature_names: Vec<String>,
    x: Array2<f64>,
    y: Array1<f64>,
    weights: Array1<f64>,
    /// Level table per feature; `None` for numeric columns
    levels: Vec<Option<Vec<String>>>,
}

impl Dataset {
    /// Create a dataset from pre-assembled arrays
    pub fn new(
        feature_names: Vec<String>,
        x: Array2<f64>,
        y: Array1<f64>,
        weights: Array1<f64>,
    ) -> Result<Self> {
        let n_features = feature_names.len();
        let dataset = Self {
            feature_names,
            levels: vec![None; n_features],
            x,
            y,
            weights,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Build a dataset from a polars DataFrame
    ///
    /// Every column other than `response` and `weight` becomes a feature.
    /// Numeric columns are cast to `f64`; string columns are label-encoded
    /// with codes assigned in sorted level order so encodings are stable
    /// across runs. When `weight` is `None` all rows get unit exposure.
    pub fn from_dataframe(
        df: &DataFrame,
        response: &str,
        weight: Option<&str>,
    ) -> Result<Self> {
        let height = df.height();
        if height == 0 {
            return Err(LanternError::DataError(
                "dataframe has no rows".to_string(),
            ));
        }

        let y = column_as_f64(df, response)?;
        let weights = match weight {
            Some(name) => column_as_f64(df, name)?,
            None => Array1::ones(height),
        };

        let mut feature_names = Vec::new();
        let mut feature_columns: Vec<Array1<f64>> = Vec::new();
        let mut levels: Vec<Option<Vec<String>>> = Vec::new();

        for col in df.get_columns() {
            let name = col.name().as_str();
            if name == response || Some(name) == weight {
                continue;
            }
            match col.dtype() {
                DataType::String => {
                    let (codes, table) = encode_string_column(col)?;
                    feature_columns.push(codes);
                    levels.push(Some(table));
                }
                _ => {
                    feature_columns.push(cast_column_f64(col)?);
                    levels.push(None);
                }
            }
            feature_names.push(name.to_string());
        }

        if feature_names.is_empty() {
            return Err(LanternError::DataError(
                "dataframe has no feature columns".to_string(),
            ));
        }

        let n_features = feature_names.len();
        let x = Array2::from_shape_fn((height, n_features), |(i, j)| {
            feature_columns[j][i]
        });

        let dataset = Self {
            feature_names,
            x,
            y,
            weights,
            levels,
        };
        dataset.validate()?;
        Ok(dataset)
    }

    fn validate(&self) -> Result<()> {
        let n_rows = self.x.nrows();
        let n_features = self.x.ncols();

        if self.feature_names.len() != n_features {
            return Err(LanternError::ShapeError {
                expected: format!("{} feature names", n_features),
                actual: format!("{}", self.feature_names.len()),
            });
        }
        if self.y.len() != n_rows || self.weights.len() != n_rows {
            return Err(LanternError::ShapeError {
                expected: format!("response and weights of length {}", n_rows),
                actual: format!("{} and {}", self.y.len(), self.weights.len()),
            });
        }
        if n_rows == 0 {
            return Err(LanternError::DataError("dataset has no rows".to_string()));
        }

        if self.x.iter().any(|v| !v.is_finite()) {
            return Err(LanternError::DataError(
                "feature matrix contains non-finite values".to_string(),
            ));
        }
        if self.y.iter().any(|v| !v.is_finite()) {
            return Err(LanternError::DataError(
                "response contains non-finite values".to_string(),
            ));
        }
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(LanternError::DataError(
                "weights must be finite and non-negative".to_string(),
            ));
        }
        if self.weights.sum() <= 0.0 {
            return Err(LanternError::DataError(
                "total weight must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    /// Number of features
    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// Feature names, in matrix column order
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Feature matrix (rows x features)
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// Observed responses
    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    /// Case weights (exposure)
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// One row as an owned vector, usable as a breakdown instance
    pub fn row(&self, index: usize) -> Result<Array1<f64>> {
        if index >= self.n_rows() {
            return Err(LanternError::InvalidParameter {
                name: "index".to_string(),
                value: index.to_string(),
                reason: format!("dataset has {} rows", self.n_rows()),
            });
        }
        Ok(self.x.row(index).to_owned())
    }

    /// Level table of a label-encoded feature, if it was categorical
    pub fn levels(&self, feature: &str) -> Result<Option<&[String]>> {
        let idx = self.feature_index(feature)?;
        Ok(self.levels[idx].as_deref())
    }

    /// Resolve a feature name to its column index
    pub fn feature_index(&self, feature: &str) -> Result<usize> {
        self.feature_names
            .iter()
            .position(|n| n.as_str() == feature)
            .ok_or_else(|| LanternError::FeatureNotFound(feature.to_string()))
    }

    /// Copy of the feature matrix with one column shuffled across rows
    ///
    /// The original matrix is left untouched.
    pub fn shuffled_copy(&self, feature: &str, rng: &mut impl Rng) -> Result<Array2<f64>> {
        let idx = self.feature_index(feature)?;
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.shuffle(rng);

        let mut x = self.x.clone();
        for (row, &src) in order.iter().enumerate() {
            x[[row, idx]] = self.x[[src, idx]];
        }
        Ok(x)
    }

    /// Seeded sample of rows without replacement, capped at `cap`
    ///
    /// Used to bound the cost of background-based attribution.
    pub fn sample_rows(&self, cap: usize, rng: &mut impl Rng) -> Array2<f64> {
        let take = cap.min(self.n_rows());
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.shuffle(rng);
        order.truncate(take);

        Array2::from_shape_fn((take, self.n_features()), |(i, j)| {
            self.x[[order[i], j]]
        })
    }
}

fn column_as_f64(df: &DataFrame, name: &str) -> Result<Array1<f64>> {
    let col = df
        .column(name)
        .map_err(|_| LanternError::FeatureNotFound(name.to_string()))?;
    cast_column_f64(col)
}

fn cast_column_f64(col: &Column) -> Result<Array1<f64>> {
    let casted = col
        .cast(&DataType::Float64)
        .map_err(|e| LanternError::DataError(e.to_string()))?;
    let ca = casted
        .f64()
        .map_err(|e| LanternError::DataError(e.to_string()))?;

    let values: Vec<f64> = ca
        .into_iter()
        .map(|v| {
            v.ok_or_else(|| {
                LanternError::DataError(format!(
                    "column '{}' contains missing values",
                    col.name()
                ))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(Array1::from_vec(values))
}

fn encode_string_column(col: &Column) -> Result<(Array1<f64>, Vec<String>)> {
    let ca = col
        .str()
        .map_err(|e| LanternError::DataError(e.to_string()))?;

    let mut table: Vec<String> = Vec::new();
    for value in ca.into_iter() {
        let value = value.ok_or_else(|| {
            LanternError::DataError(format!(
                "column '{}' contains missing values",
                col.name()
            ))
        })?;
        if !table.iter().any(|l| l.as_str() == value) {
            table.push(value.to_string());
        }
    }
    table.sort();

    let codes: Vec<f64> = ca
        .into_iter()
        .map(|v| {
            let v = v.unwrap_or_default();
            table.iter().position(|l| l.as_str() == v).unwrap_or(0) as f64
        })
        .collect();
    Ok((Array1::from_vec(codes), table))
}
