// src/processing/feature_pipeline.rs

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::preprocessor::{ChannelPreprocessor, PreprocessConfig};
use super::wavelet::{FeatureExtractor, WaveletConfig};
use crate::error::{PipelineError, Result};

const STAGE: &str = "feature_pipeline";

// -----------------------------------------------------------------------------
// PIPELINE SHAPE
// -----------------------------------------------------------------------------

/// Everything that determines how a raw window becomes a feature vector.
///
/// Persisted inside the model bundle so live inference rebuilds the exact same
/// pipeline the classifier was trained behind.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeaturePipelineSpec {
    pub sampling_rate: u32,
    pub window_samples: usize,
    pub channel_count: usize,
    pub preprocess: PreprocessConfig,
    pub wavelet: WaveletConfig,
}

// -----------------------------------------------------------------------------
// FEATURE PIPELINE
// -----------------------------------------------------------------------------

/// Preprocess then extract, for one window or a batch of windows.
pub struct FeaturePipeline {
    spec: FeaturePipelineSpec,
    preprocessor: ChannelPreprocessor,
    extractor: FeatureExtractor,
}

impl FeaturePipeline {
    pub fn new(spec: FeaturePipelineSpec) -> Result<Self> {
        let preprocessor = ChannelPreprocessor::new(&spec.preprocess, spec.sampling_rate)?;
        let extractor =
            FeatureExtractor::new(spec.wavelet.clone(), spec.window_samples, spec.channel_count)?;
        Ok(Self {
            spec,
            preprocessor,
            extractor,
        })
    }

    pub fn spec(&self) -> &FeaturePipelineSpec {
        &self.spec
    }

    pub fn feature_len(&self) -> usize {
        self.extractor.feature_len()
    }

    pub fn preprocessor(&self) -> &ChannelPreprocessor {
        &self.preprocessor
    }

    /// Turns one raw `[channels, samples]` window into its feature vector.
    pub fn features(&self, window: Array2<f64>) -> Result<Array1<f64>> {
        if window.dim() != (self.spec.channel_count, self.spec.window_samples) {
            let (expected, actual) = if window.nrows() != self.spec.channel_count {
                (self.spec.channel_count, window.nrows())
            } else {
                (self.spec.window_samples, window.ncols())
            };
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected,
                actual,
            });
        }
        let window = self.preprocessor.process(window);
        self.extractor.extract(&window)
    }

    /// Processes windows in parallel; row `i` of the result belongs to `windows[i]`.
    pub fn features_batch(&self, windows: Vec<Array2<f64>>) -> Result<Array2<f64>> {
        let count = windows.len();
        let width = self.feature_len();
        let rows: Vec<Array1<f64>> = windows
            .into_par_iter()
            .map(|window| self.features(window))
            .collect::<Result<Vec<_>>>()?;

        let mut flat = Vec::with_capacity(count * width);
        for row in &rows {
            flat.extend(row.iter().copied());
        }
        Array2::from_shape_vec((count, width), flat).map_err(|e| {
            PipelineError::invalid(STAGE, format!("could not stack feature rows: {}", e))
        })
    }
}
