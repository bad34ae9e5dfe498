// src/processing/filters/bandpass.rs

use super::{butterworth_q, Cascade, FilterKind, SecondOrderFilter, ZeroPhaseFilter};
use crate::error::{PipelineError, Result};

use serde::{Deserialize, Serialize};

const STAGE: &str = "bandpass";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BandPassFilterConfig {
    pub f_low: f64,
    pub f_high: f64,
    /// Butterworth order of each edge. Must be even.
    pub order: usize,
}

impl Default for BandPassFilterConfig {
    fn default() -> Self {
        // beta and gamma only
        Self {
            f_low: 30.0,
            f_high: 100.0,
            order: 6,
        }
    }
}

/// Butterworth band-pass built from a high-pass cascade at `f_low` and a low-pass cascade at `f_high`.
pub struct BandPassFilter {
    id: String,
    cascade: Cascade,
}

impl BandPassFilter {
    pub fn new(config: &BandPassFilterConfig, fs: f64) -> Result<Self> {
        if config.order == 0 || config.order % 2 != 0 {
            return Err(PipelineError::invalid(
                STAGE,
                format!("order {} must be a positive even number", config.order),
            ));
        }
        if !(config.f_low > 0.0 && config.f_low < config.f_high) {
            return Err(PipelineError::invalid(
                STAGE,
                format!("band {}-{} Hz is empty", config.f_low, config.f_high),
            ));
        }
        if config.f_high >= fs / 2.0 {
            return Err(PipelineError::invalid(
                STAGE,
                format!(
                    "upper edge {} Hz is not below Nyquist ({} Hz)",
                    config.f_high,
                    fs / 2.0
                ),
            ));
        }

        let qs = butterworth_q(config.order);
        let mut cascade = Cascade::new(
            qs.iter()
                .map(|&q| SecondOrderFilter::new(config.f_low, fs, q, FilterKind::HighPass))
                .collect(),
        );
        cascade.extend(Cascade::new(
            qs.iter()
                .map(|&q| SecondOrderFilter::new(config.f_high, fs, q, FilterKind::LowPass))
                .collect(),
        ));

        Ok(BandPassFilter {
            id: format!("bandpass:{}-{}", config.f_low, config.f_high),
            cascade,
        })
    }
}

impl ZeroPhaseFilter for BandPassFilter {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, signal: &mut [f64]) {
        self.cascade.filtfilt(signal);
    }
}
