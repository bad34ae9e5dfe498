// src/model/gru.rs

use std::sync::{Mutex, PoisonError};

use burn::backend::ndarray::{NdArray, NdArrayDevice};
use burn::backend::Autodiff;
use burn::module::Module;
use burn::nn::gru::{Gru, GruConfig};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use ndarray::{Array2, ArrayView1, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub type InferenceBackend = NdArray<f32>;
pub type TrainingBackend = Autodiff<InferenceBackend>;

const GLOROT: Initializer = Initializer::XavierUniform { gain: 1.0 };

// Backend RNG is process-global, so seeding and initialization run as one unit.
static INIT_LOCK: Mutex<()> = Mutex::new(());

pub fn device() -> NdArrayDevice {
    NdArrayDevice::default()
}

/// Layer widths of a network, enough to rebuild it before loading weights.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NetworkShape {
    pub input_dim: usize,
    pub recurrent_units: Vec<usize>,
    pub dense_units: Vec<usize>,
    pub classes: usize,
}

impl NetworkShape {
    fn build<B: Backend>(&self, device: &B::Device) -> GruNetwork<B> {
        let mut width = self.input_dim;
        let mut recurrent = Vec::with_capacity(self.recurrent_units.len());
        for &units in &self.recurrent_units {
            recurrent.push(
                GruConfig::new(width, units, true)
                    .with_initializer(GLOROT)
                    .init(device),
            );
            width = units;
        }
        let mut hidden = Vec::with_capacity(self.dense_units.len());
        for &units in &self.dense_units {
            hidden.push(LinearConfig::new(width, units).with_initializer(GLOROT).init(device));
            width = units;
        }
        let output = LinearConfig::new(width, self.classes)
            .with_initializer(GLOROT)
            .init(device);
        GruNetwork {
            recurrent,
            hidden,
            output,
        }
    }

    /// Fresh network with weights drawn from `seed`.
    pub fn init<B: Backend>(&self, seed: u64, device: &B::Device) -> GruNetwork<B> {
        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        B::seed(device, seed);
        self.build(device)
    }

    /// Network with the weights of a `GruNetwork::to_bytes` buffer.
    pub fn load<B: Backend>(&self, bytes: Vec<u8>, device: &B::Device) -> Result<GruNetwork<B>> {
        let skeleton = {
            let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            self.build::<B>(device)
        };
        let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .load(bytes, device)
            .map_err(|e| PipelineError::ModelWeights(format!("{:?}", e)))?;
        Ok(skeleton.load_record(record))
    }
}

/// Stacked GRU layers, dense ReLU layers and a linear head producing class logits.
#[derive(Module, Debug)]
pub struct GruNetwork<B: Backend> {
    recurrent: Vec<Gru<B>>,
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> GruNetwork<B> {
    /// Logits `[batch, classes]` from the last hidden state of the top GRU layer.
    pub fn forward(&self, input: Tensor<B, 3>) -> Tensor<B, 2> {
        let mut sequence = input;
        for gru in &self.recurrent {
            sequence = gru.forward(sequence, None);
        }
        let [batch, steps, width] = sequence.dims();
        let mut x = sequence.narrow(1, steps - 1, 1).reshape([batch, width]);
        for dense in &self.hidden {
            x = relu(dense.forward(x));
        }
        self.output.forward(x)
    }

    pub fn probabilities(&self, input: Tensor<B, 3>) -> Tensor<B, 2> {
        softmax(self.forward(input), 1)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.clone().into_record(), ())
            .map_err(|e| PipelineError::ModelWeights(format!("{:?}", e)))
    }
}

// TENSOR CONVERSION -------------------------------------------------------------

pub fn sequences_tensor<B: Backend>(x: ArrayView3<f64>, device: &B::Device) -> Tensor<B, 3> {
    let (n, steps, width) = x.dim();
    let values: Vec<f32> = x.iter().map(|&v| v as f32).collect();
    Tensor::from_data(TensorData::new(values, [n, steps, width]), device)
}

pub fn targets_tensor<B: Backend>(y: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let values: Vec<i64> = y.iter().map(|&c| c as i64).collect();
    Tensor::from_data(TensorData::new(values, [y.len()]), device)
}

/// Copies a `[rows, cols]` float tensor back into an `f64` matrix.
pub fn to_matrix<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f64>> {
    let [rows, cols] = tensor.dims();
    let data = tensor.into_data();
    let flat = data
        .as_slice::<f32>()
        .map_err(|e| PipelineError::ModelWeights(format!("{:?}", e)))?;
    Array2::from_shape_vec((rows, cols), flat.iter().map(|&v| f64::from(v)).collect())
        .map_err(|e| PipelineError::ModelWeights(e.to_string()))
}

pub fn argmax(values: ArrayView1<f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v {
                (i, v)
            } else {
                (best_i, best_v)
            }
        })
        .0
}

// OPTIMIZER ---------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

impl OptimizerConfig {
    pub fn adam(&self) -> burn::optim::AdamConfig {
        burn::optim::AdamConfig::new()
            .with_beta_1(self.beta1)
            .with_beta_2(self.beta2)
            .with_epsilon(self.epsilon)
    }
}
