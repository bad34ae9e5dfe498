// src/model/bundle.rs

use std::collections::VecDeque;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::classifier::SequenceClassifier;
use super::codec::LabelCodec;
use super::gru::argmax;
use super::reducer::{FeatureReducer, Pca, ReducerConfig, Standardizer};
use crate::error::{PipelineError, Result};
use crate::processing::feature_pipeline::{FeaturePipeline, FeaturePipelineSpec};

const STAGE: &str = "bundle";

pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Every fitted piece needed to classify a raw window, stored as one file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelArtifactBundle {
    pub format_version: u32,
    pub classifier: SequenceClassifier,
    pub label_codec: LabelCodec,
    pub feature_standardizer: Standardizer,
    pub feature_reducer: Pca,
    pub reducer_config: ReducerConfig,
    pub pipeline: FeaturePipelineSpec,
}

impl ModelArtifactBundle {
    pub fn new(
        classifier: SequenceClassifier,
        label_codec: LabelCodec,
        reducer: &FeatureReducer,
        reducer_config: ReducerConfig,
        pipeline: FeaturePipelineSpec,
    ) -> Result<Self> {
        let bundle = Self {
            format_version: BUNDLE_FORMAT_VERSION,
            classifier,
            label_codec,
            feature_standardizer: reducer.standardizer()?.clone(),
            feature_reducer: reducer.pca()?.clone(),
            reducer_config,
            pipeline,
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Checks that the pieces chain together.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(PipelineError::invalid(
                STAGE,
                format!(
                    "unsupported bundle format {} (expected {})",
                    self.format_version, BUNDLE_FORMAT_VERSION
                ),
            ));
        }
        let pipeline = FeaturePipeline::new(self.pipeline.clone())?;
        let checks = [
            (pipeline.feature_len(), self.feature_standardizer.input_dim()),
            (self.feature_standardizer.input_dim(), self.feature_reducer.input_dim()),
            (self.feature_reducer.n_components(), self.classifier.input_dim()),
            (self.label_codec.len(), self.classifier.classes()),
        ];
        for (expected, actual) in checks {
            if expected != actual {
                return Err(PipelineError::DimensionMismatch {
                    stage: STAGE,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    pub fn reducer(&self) -> Result<FeatureReducer> {
        FeatureReducer::from_parts(
            self.reducer_config.clone(),
            self.feature_standardizer.clone(),
            self.feature_reducer.clone(),
        )
    }

    /// Writes to a temporary file beside `path`, then renames it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;

        let tmp = NamedTempFile::new_in(dir).map_err(|e| PipelineError::io(dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, self)?;
            writer.flush().map_err(|e| PipelineError::io(tmp.path(), e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| PipelineError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| PipelineError::io(path, e.error))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let bundle: Self = serde_json::from_str(&text)?;
        bundle.validate()?;
        Ok(bundle)
    }
}

/// One classified window.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub label: String,
    pub confidence: f64,
    pub probabilities: Array1<f64>,
}

/// A loaded bundle wired up for window-by-window inference.
///
/// With `time_steps > 1` the most recent reduced vectors are kept and a prediction is
/// only produced once enough consecutive windows have been seen.
pub struct InferenceModel {
    pipeline: FeaturePipeline,
    reducer: FeatureReducer,
    classifier: SequenceClassifier,
    codec: LabelCodec,
    recent: VecDeque<Array1<f64>>,
}

impl InferenceModel {
    pub fn from_bundle(bundle: ModelArtifactBundle) -> Result<Self> {
        bundle.validate()?;
        let reducer = bundle.reducer()?;
        Ok(Self {
            pipeline: FeaturePipeline::new(bundle.pipeline)?,
            reducer,
            classifier: bundle.classifier,
            codec: bundle.label_codec,
            recent: VecDeque::new(),
        })
    }

    pub fn spec(&self) -> &FeaturePipelineSpec {
        self.pipeline.spec()
    }

    pub fn codec(&self) -> &LabelCodec {
        &self.codec
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }

    /// Classifies one raw `[channels, window_samples]` window.
    pub fn infer(&mut self, window: Array2<f64>) -> Result<Prediction> {
        let features = self.pipeline.features(window)?;
        let reduced = self.reducer.apply_vector(features.view())?;

        let steps = self.classifier.time_steps();
        self.recent.push_back(reduced);
        while self.recent.len() > steps {
            self.recent.pop_front();
        }
        if self.recent.len() < steps {
            return Err(PipelineError::InsufficientData {
                requested: steps,
                available: self.recent.len(),
            });
        }

        let width = self.classifier.input_dim();
        let mut sequence = Array2::zeros((steps, width));
        for (mut row, v) in sequence.axis_iter_mut(Axis(0)).zip(&self.recent) {
            row.assign(v);
        }
        let probabilities = self.classifier.predict_sequence(sequence.view())?;
        let class_index = argmax(probabilities.view());
        Ok(Prediction {
            class_index,
            label: self.codec.decode(class_index)?.to_string(),
            confidence: probabilities[class_index],
            probabilities,
        })
    }
}
