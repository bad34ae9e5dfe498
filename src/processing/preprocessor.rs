// src/processing/preprocessor.rs

use ndarray::{Array2, ArrayViewMut1};
use serde::{Deserialize, Serialize};

use super::filters::bandpass::{BandPassFilter, BandPassFilterConfig};
use super::filters::notch::{LineNoiseConfig, LineNoiseFilter};
use super::filters::ZeroPhaseFilter;
use crate::error::Result;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PreprocessConfig {
    pub line_noise: LineNoiseConfig,
    pub bandpass: BandPassFilterConfig,
    pub detrend: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            line_noise: LineNoiseConfig::default(),
            bandpass: BandPassFilterConfig::default(),
            detrend: true,
        }
    }
}

impl PreprocessConfig {
    /// Copy whose band-pass high edge sits at most at 90% of the Nyquist frequency.
    pub fn for_sampling_rate(&self, sampling_rate: u32) -> Self {
        let mut config = self.clone();
        let ceiling = 0.45 * sampling_rate as f64;
        if config.bandpass.f_high > ceiling {
            config.bandpass.f_high = ceiling;
        }
        config
    }
}

/// Per-channel denoise, band-pass and detrend, in that order.
///
/// Holds no state between windows, so one instance is shared across rayon workers.
pub struct ChannelPreprocessor {
    filters: Vec<Box<dyn ZeroPhaseFilter>>,
    detrend: bool,
}

impl ChannelPreprocessor {
    pub fn new(config: &PreprocessConfig, sampling_rate: u32) -> Result<Self> {
        let fs = sampling_rate as f64;
        let bandpass = BandPassFilter::new(&config.bandpass, fs)?;
        let line_noise = LineNoiseFilter::new(&config.line_noise, fs);

        let mut filters: Vec<Box<dyn ZeroPhaseFilter>> = Vec::with_capacity(2);
        if !line_noise.is_passthrough() {
            filters.push(Box::new(line_noise));
        }
        filters.push(Box::new(bandpass));

        Ok(Self {
            filters,
            detrend: config.detrend,
        })
    }

    pub fn filter_ids(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.id()).collect()
    }

    /// Processes every channel (row) of `window` in place.
    pub fn apply(&self, window: &mut Array2<f64>) {
        for row in window.rows_mut() {
            self.apply_channel(row);
        }
    }

    pub fn process(&self, mut window: Array2<f64>) -> Array2<f64> {
        self.apply(&mut window);
        window
    }

    fn apply_channel(&self, mut channel: ArrayViewMut1<f64>) {
        match channel.as_slice_mut() {
            Some(samples) => self.apply_slice(samples),
            None => {
                let mut samples = channel.to_vec();
                self.apply_slice(&mut samples);
                for (dst, src) in channel.iter_mut().zip(samples) {
                    *dst = src;
                }
            }
        }
    }

    fn apply_slice(&self, samples: &mut [f64]) {
        for filter in &self.filters {
            filter.apply(samples);
        }
        if self.detrend {
            detrend_linear(samples);
        }
    }
}

/// Subtracts the least-squares line through `samples`.
pub fn detrend_linear(samples: &mut [f64]) {
    let n = samples.len();
    if n < 2 {
        if let Some(v) = samples.first_mut() {
            *v = 0.0;
        }
        return;
    }

    let nf = n as f64;
    let t_mean = (nf - 1.0) / 2.0;
    let y_mean = samples.iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (i, &y) in samples.iter().enumerate() {
        let dt = i as f64 - t_mean;
        cov += dt * (y - y_mean);
        var += dt * dt;
    }
    let slope = cov / var;

    for (i, y) in samples.iter_mut().enumerate() {
        *y -= y_mean + slope * (i as f64 - t_mean);
    }
}
