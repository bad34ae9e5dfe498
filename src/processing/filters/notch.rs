// src/processing/filters/notch.rs

use super::{Cascade, FilterKind, SecondOrderFilter, ZeroPhaseFilter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MainsFrequency {
    None,
    Fifty,
    Sixty,
    FiftyAndSixty,
}

impl MainsFrequency {
    fn frequencies(self) -> &'static [f64] {
        match self {
            MainsFrequency::None => &[],
            MainsFrequency::Fifty => &[50.0],
            MainsFrequency::Sixty => &[60.0],
            MainsFrequency::FiftyAndSixty => &[50.0, 60.0],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LineNoiseConfig {
    pub mains: MainsFrequency,
    /// Width of each rejected band, in Hz.
    pub bandwidth_hz: f64,
    /// Notch sections per mains frequency; more sections widen the stop band's skirts.
    pub sections: usize,
}

impl Default for LineNoiseConfig {
    fn default() -> Self {
        Self {
            mains: MainsFrequency::FiftyAndSixty,
            bandwidth_hz: 4.0,
            sections: 2,
        }
    }
}

/// Environmental noise suppression: cascaded notches at the configured mains frequencies.
pub struct LineNoiseFilter {
    id: String,
    cascade: Cascade,
}

impl LineNoiseFilter {
    /// Notches at or above Nyquist cannot be represented and are skipped.
    pub fn new(config: &LineNoiseConfig, fs: f64) -> Self {
        let nyquist = fs / 2.0;
        let sections = config
            .mains
            .frequencies()
            .iter()
            .filter(|&&f0| f0 < nyquist)
            .flat_map(|&f0| {
                let q = f0 / config.bandwidth_hz.max(f64::EPSILON);
                std::iter::repeat(SecondOrderFilter::new(f0, fs, q, FilterKind::Notch))
                    .take(config.sections)
            })
            .collect();

        LineNoiseFilter {
            id: format!("line_noise:{:?}", config.mains),
            cascade: Cascade::new(sections),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.cascade.is_empty()
    }
}

impl ZeroPhaseFilter for LineNoiseFilter {
    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&self, signal: &mut [f64]) {
        self.cascade.filtfilt(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / fs).sin())
            .collect()
    }

    #[test]
    fn removes_mains_hum() {
        let fs = 500.0;
        let filter = LineNoiseFilter::new(&LineNoiseConfig::default(), fs);
        let mut hum = sine(50.0, fs, 4000);
        filter.apply(&mut hum);
        let peak = hum[1000..3000].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak < 0.05, "residual hum {}", peak);
    }

    #[test]
    fn skips_notches_above_nyquist() {
        let filter = LineNoiseFilter::new(&LineNoiseConfig::default(), 100.0);
        assert!(filter.is_passthrough());
        let filter = LineNoiseFilter::new(&LineNoiseConfig::default(), 110.0);
        assert!(!filter.is_passthrough());
    }

    #[test]
    fn disabled_mains_is_passthrough() {
        let config = LineNoiseConfig {
            mains: MainsFrequency::None,
            ..LineNoiseConfig::default()
        };
        let filter = LineNoiseFilter::new(&config, 250.0);
        let mut signal = sine(10.0, 250.0, 100);
        let original = signal.clone();
        filter.apply(&mut signal);
        assert_eq!(signal, original);
    }
}
