// src/model/reducer.rs

use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_reduction::Pca as LinfaPca;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const STANDARDIZER: &str = "standardizer";
const PCA: &str = "pca";
const REDUCER: &str = "feature_reducer";

fn check_width(stage: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(PipelineError::DimensionMismatch {
            stage,
            expected,
            actual,
        });
    }
    Ok(())
}

// Signs a vector so its largest-magnitude entry is positive.
fn flip_sign(mut vector: ArrayViewMut1<f64>) {
    let pivot = vector
        .iter()
        .copied()
        .fold(0.0f64, |best, v| if v.abs() > best.abs() { v } else { best });
    if pivot < 0.0 {
        vector.mapv_inplace(|v| -v);
    }
}

// STANDARDIZER ----------------------------------------------------------------

/// Per-feature zero-mean, unit-variance scaling, frozen at fit time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: ArrayView2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(PipelineError::invalid(STANDARDIZER, "cannot fit on an empty matrix"));
        }
        let n = x.nrows() as f64;
        let mean = x.sum_axis(Axis(0)) / n;
        let scale = Array1::from_iter(x.axis_iter(Axis(1)).zip(mean.iter()).map(|(column, &mu)| {
            let var = column.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            if std > f64::EPSILON {
                std
            } else {
                1.0
            }
        }));
        Ok(Self { mean, scale })
    }

    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_width(STANDARDIZER, self.input_dim(), x.ncols())?;
        Ok((&x - &self.mean) / &self.scale)
    }

    pub fn transform_vector(&self, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        check_width(STANDARDIZER, self.input_dim(), x.len())?;
        Ok((&x - &self.mean) / &self.scale)
    }
}

// PCA -------------------------------------------------------------------------

/// Linear projection onto the leading principal components.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pca {
    mean: Array1<f64>,
    /// `[n_components, input_dim]`, one component per row.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
    explained_variance_ratio: Array1<f64>,
    n_components: usize,
}

impl Pca {
    /// Keeps the fewest components whose cumulative explained variance ratio exceeds
    /// `variance_to_retain`.
    pub fn fit(x: ArrayView2<f64>, variance_to_retain: f64) -> Result<Self> {
        if !(variance_to_retain > 0.0 && variance_to_retain <= 1.0) {
            return Err(PipelineError::invalid(
                PCA,
                format!("variance_to_retain {} outside (0, 1]", variance_to_retain),
            ));
        }
        let (n, d) = x.dim();
        if n < 2 || d == 0 {
            return Err(PipelineError::invalid(
                PCA,
                format!("need at least 2 samples of non-zero width, got [{}, {}]", n, d),
            ));
        }

        let mean = x.sum_axis(Axis(0)) / n as f64;
        let total: f64 = (&x - &mean).iter().map(|v| v * v).sum();
        if total <= f64::EPSILON {
            return Err(PipelineError::invalid(PCA, "feature matrix has zero variance"));
        }

        // Centered data has rank at most n - 1.
        let max_components = (n - 1).min(d);
        let dataset = DatasetBase::from(x.to_owned());
        let fitted: LinfaPca<f64> = LinfaPca::params(max_components)
            .fit(&dataset)
            .map_err(|e| PipelineError::invalid(PCA, e.to_string()))?;

        let singular = fitted.singular_values();
        let mut order: Vec<usize> = (0..singular.len()).collect();
        order.sort_by(|&a, &b| singular[b].total_cmp(&singular[a]));

        let ratio: Array1<f64> = order.iter().map(|&i| singular[i].powi(2) / total).collect();
        let available = ratio.iter().take_while(|&&r| r > 1e-12).count().max(1);
        let mut cumulative = 0.0;
        let mut keep = available;
        for (i, r) in ratio.iter().take(available).enumerate() {
            cumulative += r;
            if cumulative > variance_to_retain {
                keep = i + 1;
                break;
            }
        }

        let mut components = fitted.components().select(Axis(0), &order[..keep]);
        for row in components.rows_mut() {
            flip_sign(row);
        }
        let explained_variance = order[..keep]
            .iter()
            .map(|&i| singular[i].powi(2) / (n - 1) as f64)
            .collect();

        Ok(Self {
            mean,
            components,
            explained_variance,
            explained_variance_ratio: ratio.slice(ndarray::s![..keep]).to_owned(),
            n_components: keep,
        })
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    pub fn explained_variance_ratio(&self) -> &Array1<f64> {
        &self.explained_variance_ratio
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        check_width(PCA, self.input_dim(), x.ncols())?;
        Ok((&x - &self.mean).dot(&self.components.t()))
    }

    pub fn transform_vector(&self, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        check_width(PCA, self.input_dim(), x.len())?;
        Ok(self.components.dot(&(&x - &self.mean)))
    }
}

// FEATURE REDUCER -------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReducerConfig {
    pub variance_to_retain: f64,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            variance_to_retain: 0.95,
        }
    }
}

/// Standardizer followed by PCA. Starts unfitted; `apply` before `fit` is an error.
#[derive(Debug, Clone)]
pub struct FeatureReducer {
    config: ReducerConfig,
    fitted: Option<(Standardizer, Pca)>,
}

impl FeatureReducer {
    pub fn new(config: ReducerConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn from_parts(config: ReducerConfig, standardizer: Standardizer, pca: Pca) -> Result<Self> {
        check_width(REDUCER, standardizer.input_dim(), pca.input_dim())?;
        Ok(Self {
            config,
            fitted: Some((standardizer, pca)),
        })
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fits both stages on the training matrix and returns the reduced training matrix.
    pub fn fit(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let standardizer = Standardizer::fit(x)?;
        let scaled = standardizer.transform(x)?;
        let pca = Pca::fit(scaled.view(), self.config.variance_to_retain)?;
        let reduced = pca.transform(scaled.view())?;
        self.fitted = Some((standardizer, pca));
        Ok(reduced)
    }

    fn parts(&self) -> Result<&(Standardizer, Pca)> {
        self.fitted
            .as_ref()
            .ok_or(PipelineError::NotFitted { stage: REDUCER })
    }

    pub fn apply(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (standardizer, pca) = self.parts()?;
        pca.transform(standardizer.transform(x)?.view())
    }

    pub fn apply_vector(&self, x: ArrayView1<f64>) -> Result<Array1<f64>> {
        let (standardizer, pca) = self.parts()?;
        pca.transform_vector(standardizer.transform_vector(x)?.view())
    }

    pub fn input_dim(&self) -> Result<usize> {
        Ok(self.parts()?.0.input_dim())
    }

    pub fn output_dim(&self) -> Result<usize> {
        Ok(self.parts()?.1.n_components())
    }

    pub fn standardizer(&self) -> Result<&Standardizer> {
        Ok(&self.parts()?.0)
    }

    pub fn pca(&self) -> Result<&Pca> {
        Ok(&self.parts()?.1)
    }
}
