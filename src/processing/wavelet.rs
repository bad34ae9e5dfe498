// src/processing/wavelet.rs

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const STAGE: &str = "wavelet";

const HAAR_LO: [f64; 2] = [std::f64::consts::FRAC_1_SQRT_2, std::f64::consts::FRAC_1_SQRT_2];

const DB2_LO: [f64; 4] = [
    -0.129_409_522_550_921_45,
    0.224_143_868_041_857_35,
    0.836_516_303_737_469,
    0.482_962_913_144_690_25,
];

const DB4_LO: [f64; 8] = [
    -0.010_597_401_784_997_278,
    0.032_883_011_666_982_945,
    0.030_841_381_835_986_965,
    -0.187_034_811_718_881_14,
    -0.027_983_769_416_983_85,
    0.630_880_767_929_590_4,
    0.714_846_570_552_541_5,
    0.230_377_813_308_855_23,
];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Wavelet {
    Haar,
    Db2,
    Db4,
}

impl Wavelet {
    /// Decomposition low-pass filter.
    pub fn dec_lo(self) -> &'static [f64] {
        match self {
            Wavelet::Haar => &HAAR_LO,
            Wavelet::Db2 => &DB2_LO,
            Wavelet::Db4 => &DB4_LO,
        }
    }

    /// Decomposition high-pass filter, the quadrature mirror of `dec_lo`.
    pub fn dec_hi(self) -> Vec<f64> {
        let lo = self.dec_lo();
        let len = lo.len();
        (0..len)
            .map(|k| {
                let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
                sign * lo[len - 1 - k]
            })
            .collect()
    }

    pub fn filter_len(self) -> usize {
        self.dec_lo().len()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WaveletConfig {
    pub wavelet: Wavelet,
    pub levels: usize,
}

impl Default for WaveletConfig {
    fn default() -> Self {
        Self {
            wavelet: Wavelet::Db4,
            levels: 5,
        }
    }
}

/// Coefficient count produced by one decomposition step on `n` samples.
fn step_len(n: usize, filter_len: usize) -> usize {
    (n + filter_len - 1) / 2
}

/// Half-sample symmetric index into a signal of length `n`.
fn symmetric_index(mut idx: isize, n: usize) -> usize {
    let n = n as isize;
    loop {
        if idx < 0 {
            idx = -idx - 1;
        } else if idx >= n {
            idx = 2 * n - idx - 1;
        } else {
            return idx as usize;
        }
    }
}

fn downsampling_convolution(signal: &[f64], filter: &[f64]) -> Vec<f64> {
    let n = signal.len();
    let out_len = step_len(n, filter.len());
    (0..out_len)
        .map(|k| {
            let i = (2 * k + 1) as isize;
            filter
                .iter()
                .enumerate()
                .map(|(j, h)| h * signal[symmetric_index(i - j as isize, n)])
                .sum()
        })
        .collect()
}

/// Multi-level DWT returning `[A_L, D_L, D_{L-1}, ..., D_1]`.
pub fn wavedec(signal: &[f64], wavelet: Wavelet, levels: usize) -> Vec<Vec<f64>> {
    let lo = wavelet.dec_lo();
    let hi = wavelet.dec_hi();

    let mut details = Vec::with_capacity(levels);
    let mut approx = signal.to_vec();
    for _ in 0..levels {
        if approx.is_empty() {
            break;
        }
        let detail = downsampling_convolution(&approx, &hi);
        approx = downsampling_convolution(&approx, lo);
        details.push(detail);
    }

    let mut coeffs = Vec::with_capacity(levels + 1);
    coeffs.push(approx);
    coeffs.extend(details.into_iter().rev());
    coeffs
}

/// Length of the concatenated coefficient vector for one channel.
pub fn channel_feature_len(window_len: usize, wavelet: Wavelet, levels: usize) -> usize {
    if window_len == 0 {
        return 0;
    }
    let filter_len = wavelet.filter_len();
    let mut n = window_len;
    let mut total = 0;
    for _ in 0..levels {
        n = step_len(n, filter_len);
        total += n;
    }
    total + n
}

pub fn feature_len(window_len: usize, channel_count: usize, wavelet: Wavelet, levels: usize) -> usize {
    channel_count * channel_feature_len(window_len, wavelet, levels)
}

/// Flattens a preprocessed window into one wavelet feature vector.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: WaveletConfig,
    window_len: usize,
    channel_count: usize,
    feature_len: usize,
}

impl FeatureExtractor {
    pub fn new(config: WaveletConfig, window_len: usize, channel_count: usize) -> Result<Self> {
        if config.levels == 0 {
            return Err(PipelineError::invalid(STAGE, "decomposition needs at least one level"));
        }
        if window_len == 0 || channel_count == 0 {
            return Err(PipelineError::invalid(
                STAGE,
                format!("empty window shape [{}, {}]", channel_count, window_len),
            ));
        }
        let feature_len = feature_len(window_len, channel_count, config.wavelet, config.levels);
        Ok(Self {
            config,
            window_len,
            channel_count,
            feature_len,
        })
    }

    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    pub fn config(&self) -> &WaveletConfig {
        &self.config
    }

    pub fn extract(&self, window: &Array2<f64>) -> Result<Array1<f64>> {
        if window.nrows() != self.channel_count {
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected: self.channel_count,
                actual: window.nrows(),
            });
        }
        if window.ncols() != self.window_len {
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected: self.window_len,
                actual: window.ncols(),
            });
        }

        let mut features = Vec::with_capacity(self.feature_len);
        for row in window.rows() {
            features.extend(self.extract_channel(row).into_iter().flatten());
        }

        if features.len() != self.feature_len {
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected: self.feature_len,
                actual: features.len(),
            });
        }
        Ok(Array1::from(features))
    }

    fn extract_channel(&self, channel: ArrayView1<f64>) -> Vec<Vec<f64>> {
        let samples = channel.to_vec();
        wavedec(&samples, self.config.wavelet, self.config.levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_orthonormal() {
        for wavelet in [Wavelet::Haar, Wavelet::Db2, Wavelet::Db4] {
            let lo = wavelet.dec_lo();
            let hi = wavelet.dec_hi();
            let energy: f64 = lo.iter().map(|v| v * v).sum();
            let cross: f64 = lo.iter().zip(&hi).map(|(a, b)| a * b).sum();
            let dc: f64 = lo.iter().sum();
            assert!((energy - 1.0).abs() < 1e-10, "{:?}", wavelet);
            assert!(cross.abs() < 1e-10, "{:?}", wavelet);
            assert!((dc - std::f64::consts::SQRT_2).abs() < 1e-10, "{:?}", wavelet);
        }
    }

    #[test]
    fn db4_on_one_second_window() {
        // 250 -> 128 -> 67 -> 37 -> 22 -> 14, plus the final approximation
        assert_eq!(channel_feature_len(250, Wavelet::Db4, 5), 128 + 67 + 37 + 22 + 14 + 14);
        assert_eq!(feature_len(250, 8, Wavelet::Db4, 5), 8 * 282);
    }

    #[test]
    fn coefficient_order_is_approximation_first() {
        let signal: Vec<f64> = (0..64).map(|i| (i as f64 * 0.3).sin()).collect();
        let coeffs = wavedec(&signal, Wavelet::Db4, 3);
        let lens: Vec<usize> = coeffs.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![14, 14, 21, 35]);
    }

    #[test]
    fn haar_constant_has_no_detail() {
        let coeffs = wavedec(&[2.0; 16], Wavelet::Haar, 2);
        assert!(coeffs[1].iter().chain(&coeffs[2]).all(|d| d.abs() < 1e-12));
        assert!(coeffs[0].iter().all(|a| (a - 4.0).abs() < 1e-12));
    }

    #[test]
    fn extraction_is_deterministic() {
        let window = Array2::from_shape_fn((3, 250), |(c, i)| ((c + 1) as f64 * i as f64 * 0.07).cos());
        let extractor = FeatureExtractor::new(WaveletConfig::default(), 250, 3).unwrap();
        let first = extractor.extract(&window).unwrap();
        let second = extractor.extract(&window).unwrap();
        assert_eq!(first.len(), extractor.feature_len());
        let first_bits: Vec<u64> = first.iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn wrong_window_shape_is_rejected() {
        let extractor = FeatureExtractor::new(WaveletConfig::default(), 250, 3).unwrap();
        let err = extractor.extract(&Array2::zeros((2, 250))).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { expected: 3, actual: 2, .. }));
    }
}
