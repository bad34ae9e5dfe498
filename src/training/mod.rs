// src/training/mod.rs

use std::path::PathBuf;

use ndarray::{s, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::bundle::ModelArtifactBundle;
use crate::model::classifier::{ClassifierConfig, SequenceClassifier, TrainingHistory};
use crate::model::codec::LabelCodec;
use crate::model::metrics::{classification_report, ClassificationReport};
use crate::model::reducer::{FeatureReducer, ReducerConfig};
use crate::processing::feature_pipeline::{FeaturePipeline, FeaturePipelineSpec};
use crate::processing::preprocessor::PreprocessConfig;
use crate::processing::segmenter::{segment_trial, SegmenterConfig, Window};
use crate::processing::wavelet::WaveletConfig;
use crate::recording::Recording;
use crate::utils::log::{log_csv, log_with_header, Logger};

const STAGE: &str = "training";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrainingConfig {
    pub segmenter: SegmenterConfig,
    pub preprocess: PreprocessConfig,
    pub wavelet: WaveletConfig,
    pub reducer: ReducerConfig,
    pub classifier: ClassifierConfig,
    /// Share of sequences held out for the final report.
    pub test_fraction: f64,
    pub shuffle_split: bool,
    pub split_seed: u64,
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_fraction: f64,
    /// Consecutive windows of one trial fed to the classifier as one sequence.
    pub time_steps: usize,
    pub history_csv: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            preprocess: PreprocessConfig::default(),
            wavelet: WaveletConfig::default(),
            reducer: ReducerConfig::default(),
            classifier: ClassifierConfig::default(),
            test_fraction: 0.25,
            shuffle_split: true,
            split_seed: 42,
            epochs: 10,
            batch_size: 64,
            validation_fraction: 0.2,
            time_steps: 1,
            history_csv: None,
        }
    }
}

pub struct TrainingOutcome {
    pub bundle: ModelArtifactBundle,
    pub history: TrainingHistory,
    pub report: ClassificationReport,
    pub test_loss: f64,
    pub test_accuracy: f64,
}

/// Labelled sequences `[n, time_steps, width]` built from reduced window features.
struct Sequences {
    x: Array3<f64>,
    y: Vec<usize>,
}

pub struct TrainingOrchestrator {
    config: TrainingConfig,
    logger: Logger,
}

impl TrainingOrchestrator {
    pub fn new(config: TrainingConfig, logger: Logger) -> Result<Self> {
        if !(0.0..1.0).contains(&config.test_fraction) {
            return Err(PipelineError::invalid(
                STAGE,
                format!("test_fraction {} outside [0, 1)", config.test_fraction),
            ));
        }
        if config.time_steps == 0 {
            return Err(PipelineError::invalid(STAGE, "time_steps must be at least 1"));
        }
        Ok(Self { config, logger })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Segment, extract, reduce, encode, split, train and evaluate one recording.
    pub fn run(&self, recording: &Recording) -> Result<TrainingOutcome> {
        let fs = recording.sampling_rate();
        let (window_samples, overlap) = self.config.segmenter.resolve(fs)?;
        let channel_count = recording.eeg_channels().len();

        // 1. windows, grouped by trial
        let mut windows: Vec<Window<&'static str>> = Vec::new();
        for (trial, (label, eeg)) in recording.labelled_eeg().into_iter().enumerate() {
            windows.extend(segment_trial(eeg.view(), label, trial, window_samples, overlap)?);
        }
        if windows.is_empty() {
            return Err(PipelineError::InsufficientData {
                requested: window_samples,
                available: recording
                    .intent_trials()
                    .iter()
                    .chain(recording.baseline_trials())
                    .map(|t| t.ncols())
                    .max()
                    .unwrap_or(0),
            });
        }
        self.logger.info(
            STAGE,
            &format!(
                "{} windows of {} samples (overlap {}) from {} trials",
                windows.len(),
                window_samples,
                overlap,
                recording.intent_trials().len() + recording.baseline_trials().len()
            ),
        );

        // 2. features
        let spec = FeaturePipelineSpec {
            sampling_rate: fs,
            window_samples,
            channel_count,
            preprocess: self.config.preprocess.clone(),
            wavelet: self.config.wavelet.clone(),
        };
        let pipeline = FeaturePipeline::new(spec.clone())?;
        let labels: Vec<&'static str> = windows.iter().map(|w| w.label).collect();
        let trials: Vec<usize> = windows.iter().map(|w| w.trial).collect();
        let features = pipeline.features_batch(windows.into_iter().map(|w| w.data).collect())?;
        self.logger.debug(STAGE, &format!("feature matrix {:?}", features.dim()));

        // 3. reduce
        let mut reducer = FeatureReducer::new(self.config.reducer.clone());
        let reduced = reducer.fit(features.view())?;
        self.logger.info(
            STAGE,
            &format!(
                "reduced {} features to {} components",
                features.ncols(),
                reduced.ncols()
            ),
        );

        // 4. encode
        let codec = LabelCodec::fit(labels.iter())?;
        let encoded = codec.encode_all(&labels)?;

        // 5. sequences and split
        let sequences = build_sequences(&reduced, &encoded, &trials, self.config.time_steps)?;
        let (train, test) = self.split(sequences)?;
        self.logger.info(
            STAGE,
            &format!("{} training and {} test sequences", train.y.len(), test.y.len()),
        );

        // 6. train
        let mut classifier = SequenceClassifier::new(
            self.config.classifier.clone(),
            self.config.time_steps,
            reduced.ncols(),
            codec.len(),
        )?;
        let history = classifier.fit(
            train.x.view(),
            &train.y,
            self.config.validation_fraction,
            self.config.epochs,
            self.config.batch_size,
        )?;
        for epoch in &history.epochs {
            self.logger.info(
                STAGE,
                &format!(
                    "epoch {}/{} loss {:.4} acc {:.4}{}",
                    epoch.epoch,
                    self.config.epochs,
                    epoch.loss,
                    epoch.accuracy,
                    match (epoch.val_loss, epoch.val_accuracy) {
                        (Some(l), Some(a)) => format!(" val_loss {:.4} val_acc {:.4}", l, a),
                        _ => String::new(),
                    }
                ),
            );
            if let Some(path) = &self.config.history_csv {
                log_csv(path, &TrainingHistory::CSV_HEADERS, &TrainingHistory::csv_row(epoch))?;
            }
        }

        // 7. evaluate
        let (eval_x, eval_y) = if test.y.is_empty() {
            self.logger
                .warn(STAGE, "no test sequences, reporting on the training set");
            (train.x.view(), train.y.as_slice())
        } else {
            (test.x.view(), test.y.as_slice())
        };
        let (test_loss, test_accuracy) = classifier.evaluate(eval_x, eval_y)?;
        let predicted = classifier.predict_classes(eval_x)?;
        let report = classification_report(eval_y, &predicted, codec.classes());
        self.logger.info(
            STAGE,
            &format!("test loss {:.4}, test accuracy {:.4}", test_loss, test_accuracy),
        );
        self.logger.info(STAGE, &format!("classification report\n{}", report));
        let logging = self.logger.config();
        if logging.enable_file_logging {
            if let Err(e) = log_with_header(
                &logging.log_dir,
                &logging.log_file,
                "classification report",
                &report.to_string(),
            ) {
                self.logger.warn(STAGE, &format!("could not write report: {}", e));
            }
        }

        let bundle = ModelArtifactBundle::new(
            classifier,
            codec,
            &reducer,
            self.config.reducer.clone(),
            spec,
        )?;

        Ok(TrainingOutcome {
            bundle,
            history,
            report,
            test_loss,
            test_accuracy,
        })
    }

    fn split(&self, sequences: Sequences) -> Result<(Sequences, Sequences)> {
        let n = sequences.y.len();
        let n_test = (n as f64 * self.config.test_fraction).ceil() as usize;
        let n_train = n - n_test;
        if n_train == 0 {
            return Err(PipelineError::InsufficientData {
                requested: n_test + 1,
                available: n,
            });
        }

        let mut order: Vec<usize> = (0..n).collect();
        if self.config.shuffle_split {
            order.shuffle(&mut StdRng::seed_from_u64(self.config.split_seed));
        }
        let take = |idx: &[usize]| Sequences {
            x: sequences.x.select(Axis(0), idx),
            y: idx.iter().map(|&i| sequences.y[i]).collect(),
        };
        Ok((take(&order[..n_train]), take(&order[n_train..])))
    }
}

/// Groups consecutive windows of the same trial into `time_steps`-long sequences
/// labelled with the trial's class.
fn build_sequences(reduced: &Array2<f64>, labels: &[usize], trials: &[usize], time_steps: usize) -> Result<Sequences> {
    let width = reduced.ncols();
    let mut starts = Vec::new();
    let mut i = 0;
    while i < trials.len() {
        let mut end = i;
        while end < trials.len() && trials[end] == trials[i] {
            end += 1;
        }
        if end - i >= time_steps {
            starts.extend(i..=end - time_steps);
        }
        i = end;
    }
    if starts.is_empty() {
        return Err(PipelineError::InsufficientData {
            requested: time_steps,
            available: 0,
        });
    }

    let mut x = Array3::zeros((starts.len(), time_steps, width));
    for (mut dst, &start) in x.axis_iter_mut(Axis(0)).zip(&starts) {
        dst.assign(&reduced.slice(s![start..start + time_steps, ..]));
    }
    let y = starts.iter().map(|&s| labels[s]).collect();
    Ok(Sequences { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_never_cross_trials() {
        let reduced = Array2::from_shape_fn((5, 2), |(r, c)| (r * 10 + c) as f64);
        let labels = [1, 1, 1, 0, 0];
        let trials = [0, 0, 0, 1, 1];
        let seq = build_sequences(&reduced, &labels, &trials, 2).unwrap();
        // trial 0 gives starts 0 and 1, trial 1 gives start 3
        assert_eq!(seq.y, vec![1, 1, 0]);
        assert_eq!(seq.x.dim(), (3, 2, 2));
        assert_eq!(seq.x[[2, 0, 0]], 30.0);
        assert_eq!(seq.x[[2, 1, 1]], 41.0);
    }

    #[test]
    fn single_step_sequences_keep_every_window() {
        let reduced = Array2::<f64>::zeros((4, 3));
        let seq = build_sequences(&reduced, &[0, 1, 0, 1], &[0, 0, 1, 1], 1).unwrap();
        assert_eq!(seq.x.dim(), (4, 1, 3));
    }

    #[test]
    fn too_long_sequences_are_insufficient_data() {
        let reduced = Array2::<f64>::zeros((2, 3));
        assert!(matches!(
            build_sequences(&reduced, &[0, 1], &[0, 1], 2),
            Err(PipelineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn split_sizes_follow_test_fraction() {
        let orchestrator = TrainingOrchestrator::new(TrainingConfig::default(), Logger::console_only()).unwrap();
        let sequences = Sequences {
            x: Array3::zeros((10, 1, 2)),
            y: (0..10).map(|i| i % 2).collect(),
        };
        let (train, test) = orchestrator.split(sequences).unwrap();
        assert_eq!(train.y.len(), 7);
        assert_eq!(test.y.len(), 3);
    }

    #[test]
    fn rejects_bad_test_fraction() {
        let config = TrainingConfig {
            test_fraction: 1.0,
            ..TrainingConfig::default()
        };
        assert!(TrainingOrchestrator::new(config, Logger::console_only()).is_err());
    }
}
