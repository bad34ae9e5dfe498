// src/model/classifier.rs

use base64::Engine;
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::gru::{
    argmax, device, sequences_tensor, targets_tensor, to_matrix, GruNetwork, InferenceBackend, NetworkShape,
    OptimizerConfig, TrainingBackend,
};
use crate::error::{PipelineError, Result};

const STAGE: &str = "classifier";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeighting {
    #[default]
    None,
    /// Weight class `c` by `n / (k * n_c)` over the training part.
    Balanced,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub recurrent_units: Vec<usize>,
    pub dense_units: Vec<usize>,
    pub optimizer: OptimizerConfig,
    pub class_weighting: ClassWeighting,
    pub seed: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            recurrent_units: vec![128, 64],
            dense_units: vec![32],
            optimizer: OptimizerConfig::default(),
            class_weighting: ClassWeighting::None,
            seed: 42,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub const CSV_HEADERS: [&'static str; 5] = ["epoch", "loss", "accuracy", "val_loss", "val_accuracy"];

    pub fn csv_row(metrics: &EpochMetrics) -> Vec<String> {
        let optional = |v: Option<f64>| v.map(|v| format!("{:.6}", v)).unwrap_or_default();
        vec![
            metrics.epoch.to_string(),
            format!("{:.6}", metrics.loss),
            format!("{:.6}", metrics.accuracy),
            optional(metrics.val_loss),
            optional(metrics.val_accuracy),
        ]
    }
}

/// Recurrent sequence classifier over `[examples, time_steps, features]` input.
#[derive(Debug, Clone)]
pub struct SequenceClassifier {
    config: ClassifierConfig,
    time_steps: usize,
    shape: NetworkShape,
    network: GruNetwork<InferenceBackend>,
}

/// On-disk form: layer widths plus the weight record, base64 encoded.
#[derive(Serialize, Deserialize)]
struct ClassifierFile {
    config: ClassifierConfig,
    time_steps: usize,
    shape: NetworkShape,
    weights: String,
}

impl SequenceClassifier {
    pub fn new(config: ClassifierConfig, time_steps: usize, input_dim: usize, classes: usize) -> Result<Self> {
        if time_steps == 0 || input_dim == 0 {
            return Err(PipelineError::invalid(STAGE, "time_steps and input width must be positive"));
        }
        if classes < 2 {
            return Err(PipelineError::invalid(STAGE, format!("need at least 2 classes, got {}", classes)));
        }
        if config.recurrent_units.is_empty() {
            return Err(PipelineError::invalid(STAGE, "at least one recurrent layer is required"));
        }
        if config.recurrent_units.iter().chain(&config.dense_units).any(|&u| u == 0) {
            return Err(PipelineError::invalid(STAGE, "layer widths must be positive"));
        }
        let shape = NetworkShape {
            input_dim,
            recurrent_units: config.recurrent_units.clone(),
            dense_units: config.dense_units.clone(),
            classes,
        };
        let network = shape.init(config.seed, &device());
        Ok(Self {
            config,
            time_steps,
            shape,
            network,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn time_steps(&self) -> usize {
        self.time_steps
    }

    pub fn input_dim(&self) -> usize {
        self.shape.input_dim
    }

    pub fn classes(&self) -> usize {
        self.shape.classes
    }

    fn check_input(&self, x: &ArrayView3<f64>) -> Result<()> {
        let (_, steps, width) = x.dim();
        if steps != self.time_steps {
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected: self.time_steps,
                actual: steps,
            });
        }
        if width != self.input_dim() {
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected: self.input_dim(),
                actual: width,
            });
        }
        Ok(())
    }

    fn check_labels(&self, x: &ArrayView3<f64>, y: &[usize]) -> Result<()> {
        if y.len() != x.len_of(Axis(0)) {
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected: x.len_of(Axis(0)),
                actual: y.len(),
            });
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= self.classes()) {
            return Err(PipelineError::UnknownLabel(format!("class index {}", bad)));
        }
        Ok(())
    }

    fn class_weights(&self, y: &[usize]) -> Vec<f64> {
        let k = self.classes();
        match self.config.class_weighting {
            ClassWeighting::None => vec![1.0; k],
            ClassWeighting::Balanced => {
                let mut counts = vec![0usize; k];
                for &c in y {
                    counts[c] += 1;
                }
                counts
                    .iter()
                    .map(|&n_c| {
                        if n_c == 0 {
                            0.0
                        } else {
                            y.len() as f64 / (k as f64 * n_c as f64)
                        }
                    })
                    .collect()
            }
        }
    }

    /// Trains in place. The trailing `validation_fraction` of the examples is held out
    /// and the rest is reshuffled every epoch.
    pub fn fit(
        &mut self,
        x: ArrayView3<f64>,
        y: &[usize],
        validation_fraction: f64,
        epochs: usize,
        batch_size: usize,
    ) -> Result<TrainingHistory> {
        self.check_input(&x)?;
        self.check_labels(&x, y)?;
        if !(0.0..1.0).contains(&validation_fraction) {
            return Err(PipelineError::invalid(
                STAGE,
                format!("validation fraction {} outside [0, 1)", validation_fraction),
            ));
        }
        if batch_size == 0 {
            return Err(PipelineError::invalid(STAGE, "batch size must be positive"));
        }

        let n = y.len();
        let n_val = (n as f64 * validation_fraction).floor() as usize;
        let n_train = n - n_val;
        if n_train == 0 {
            return Err(PipelineError::InsufficientData {
                requested: 1,
                available: 0,
            });
        }

        let weights: Option<Vec<f32>> = match self.config.class_weighting {
            ClassWeighting::None => None,
            ClassWeighting::Balanced => Some(
                self.class_weights(&y[..n_train])
                    .into_iter()
                    .map(|w| w as f32)
                    .collect(),
            ),
        };

        let device = device();
        let mut model: GruNetwork<TrainingBackend> = self.shape.load(self.network.to_bytes()?, &device)?;
        let mut optimizer = self
            .config
            .optimizer
            .adam()
            .init::<TrainingBackend, GruNetwork<TrainingBackend>>();
        let loss_fn = CrossEntropyLossConfig::new().with_weights(weights).init(&device);
        let learning_rate = self.config.optimizer.learning_rate;

        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1));
        let mut order: Vec<usize> = (0..n_train).collect();
        let mut history = TrainingHistory::default();

        let x_val = x.slice(ndarray::s![n_train.., .., ..]);
        let y_val = &y[n_train..];

        for epoch in 1..=epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;
            let mut correct = 0usize;

            for batch in order.chunks(batch_size) {
                let targets: Vec<usize> = batch.iter().map(|&i| y[i]).collect();
                let inputs = sequences_tensor::<TrainingBackend>(x.select(Axis(0), batch).view(), &device);
                let logits = model.forward(inputs);
                let loss = loss_fn.forward(logits.clone(), targets_tensor(&targets, &device));

                loss_sum += to_matrix(loss.clone().reshape([1, 1]))?[[0, 0]] * batch.len() as f64;
                let scores = to_matrix(logits)?;
                correct += scores
                    .rows()
                    .into_iter()
                    .zip(&targets)
                    .filter(|(row, &target)| argmax(row.view()) == target)
                    .count();

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(learning_rate, model, grads);
            }
            self.network = model.valid();

            let (val_loss, val_accuracy) = if n_val > 0 {
                let (l, a) = self.evaluate(x_val, y_val)?;
                (Some(l), Some(a))
            } else {
                (None, None)
            };

            history.epochs.push(EpochMetrics {
                epoch,
                loss: loss_sum / n_train as f64,
                accuracy: correct as f64 / n_train as f64,
                val_loss,
                val_accuracy,
            });
        }
        Ok(history)
    }

    /// Class probabilities, one row per example.
    pub fn predict(&self, x: ArrayView3<f64>) -> Result<Array2<f64>> {
        self.check_input(&x)?;
        if x.len_of(Axis(0)) == 0 {
            return Ok(Array2::zeros((0, self.classes())));
        }
        let device = device();
        to_matrix(self.network.probabilities(sequences_tensor(x, &device)))
    }

    /// Probabilities for one `[time_steps, features]` sequence.
    pub fn predict_sequence(&self, sequence: ArrayView2<f64>) -> Result<Array1<f64>> {
        let probabilities = self.predict(sequence.insert_axis(Axis(0)))?;
        Ok(probabilities.row(0).to_owned())
    }

    pub fn predict_classes(&self, x: ArrayView3<f64>) -> Result<Vec<usize>> {
        let probabilities = self.predict(x)?;
        Ok(probabilities.rows().into_iter().map(argmax).collect())
    }

    /// Mean unweighted cross-entropy and accuracy.
    pub fn evaluate(&self, x: ArrayView3<f64>, y: &[usize]) -> Result<(f64, f64)> {
        self.check_labels(&x, y)?;
        let probabilities = self.predict(x)?;
        if y.is_empty() {
            return Ok((0.0, 0.0));
        }
        let mut loss = 0.0;
        let mut correct = 0usize;
        for (row, &target) in probabilities.rows().into_iter().zip(y) {
            loss -= row[target].max(1e-12).ln();
            correct += usize::from(argmax(row) == target);
        }
        Ok((loss / y.len() as f64, correct as f64 / y.len() as f64))
    }
}

impl PartialEq for SequenceClassifier {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
            && self.time_steps == other.time_steps
            && self.shape == other.shape
            && matches!(
                (self.network.to_bytes(), other.network.to_bytes()),
                (Ok(a), Ok(b)) if a == b
            )
    }
}

impl Serialize for SequenceClassifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let bytes = self.network.to_bytes().map_err(serde::ser::Error::custom)?;
        ClassifierFile {
            config: self.config.clone(),
            time_steps: self.time_steps,
            shape: self.shape.clone(),
            weights: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SequenceClassifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let file = ClassifierFile::deserialize(deserializer)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&file.weights)
            .map_err(serde::de::Error::custom)?;
        let network = file
            .shape
            .load(bytes, &device())
            .map_err(serde::de::Error::custom)?;
        Ok(Self {
            config: file.config,
            time_steps: file.time_steps,
            shape: file.shape,
            network,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::Rng;

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            recurrent_units: vec![8],
            dense_units: vec![4],
            optimizer: OptimizerConfig {
                learning_rate: 0.02,
                ..OptimizerConfig::default()
            },
            ..ClassifierConfig::default()
        }
    }

    // Class 1 examples sit at +1, class 0 at -1, plus noise.
    fn separable(n: usize, steps: usize, width: usize, seed: u64) -> (Array3<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let y: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let x = Array3::from_shape_fn((n, steps, width), |(i, _, _)| {
            let centre = if y[i] == 1 { 1.0 } else { -1.0 };
            centre + rng.gen_range(-0.3..0.3)
        });
        (x, y)
    }

    #[test]
    fn learns_a_separable_problem() {
        let (x, y) = separable(60, 2, 3, 7);
        let mut clf = SequenceClassifier::new(small_config(), 2, 3, 2).unwrap();
        let history = clf.fit(x.view(), &y, 0.2, 30, 8).unwrap();

        assert_eq!(history.epochs.len(), 30);
        let last = history.last().unwrap();
        assert!(last.val_loss.is_some());
        assert!(last.loss < history.epochs[0].loss);

        let (_, accuracy) = clf.evaluate(x.view(), &y).unwrap();
        assert!(accuracy > 0.9, "accuracy {}", accuracy);
    }

    #[test]
    fn training_is_reproducible_for_a_seed() {
        let (x, y) = separable(20, 1, 3, 1);
        let mut a = SequenceClassifier::new(small_config(), 1, 3, 2).unwrap();
        let mut b = SequenceClassifier::new(small_config(), 1, 3, 2).unwrap();
        a.fit(x.view(), &y, 0.0, 3, 4).unwrap();
        b.fit(x.view(), &y, 0.0, 3, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn predictions_are_probability_rows() {
        let (x, _) = separable(5, 2, 3, 2);
        let clf = SequenceClassifier::new(small_config(), 2, 3, 2).unwrap();
        let p = clf.predict(x.view()).unwrap();
        assert_eq!(p.dim(), (5, 2));
        for row in p.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn json_round_trip_keeps_weights() {
        let (x, y) = separable(12, 2, 3, 4);
        let mut clf = SequenceClassifier::new(small_config(), 2, 3, 2).unwrap();
        clf.fit(x.view(), &y, 0.0, 2, 4).unwrap();

        let json = serde_json::to_string(&clf).unwrap();
        let restored: SequenceClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, clf);
        assert_eq!(restored.predict(x.view()).unwrap(), clf.predict(x.view()).unwrap());
    }

    #[test]
    fn corrupt_weights_fail_to_load() {
        let clf = SequenceClassifier::new(small_config(), 1, 3, 2).unwrap();
        let mut value = serde_json::to_value(&clf).unwrap();
        value["weights"] = serde_json::Value::String("AAAA".into());
        assert!(serde_json::from_value::<SequenceClassifier>(value).is_err());
    }

    #[test]
    fn wrong_width_is_rejected() {
        let clf = SequenceClassifier::new(small_config(), 2, 3, 2).unwrap();
        let x = Array3::<f64>::zeros((4, 2, 5));
        assert!(matches!(
            clf.predict(x.view()),
            Err(PipelineError::DimensionMismatch {
                expected: 3,
                actual: 5,
                ..
            })
        ));
        let x = Array3::<f64>::zeros((4, 1, 3));
        assert!(clf.predict(x.view()).is_err());
    }

    #[test]
    fn balanced_weights_follow_class_frequency() {
        let config = ClassifierConfig {
            class_weighting: ClassWeighting::Balanced,
            ..small_config()
        };
        let clf = SequenceClassifier::new(config, 1, 3, 2).unwrap();
        let w = clf.class_weights(&[0, 0, 0, 1]);
        assert!((w[0] - 4.0 / 6.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn bad_fit_arguments() {
        let (x, y) = separable(4, 1, 3, 3);
        let mut clf = SequenceClassifier::new(small_config(), 1, 3, 2).unwrap();
        assert!(clf.fit(x.view(), &y, 1.0, 1, 2).is_err());
        assert!(clf.fit(x.view(), &y, 0.0, 1, 0).is_err());
        assert!(clf.fit(x.view(), &y[..3], 0.0, 1, 2).is_err());
        assert!(matches!(
            clf.fit(x.view(), &[0, 1, 2, 0], 0.0, 1, 2),
            Err(PipelineError::UnknownLabel(_))
        ));
    }
}
