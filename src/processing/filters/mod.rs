// src/processing/filters/mod.rs

pub mod bandpass;
pub mod notch;

/// A filter run forward then backward over a whole channel, so it adds no phase shift.
pub trait ZeroPhaseFilter: Send + Sync {
    fn id(&self) -> &str;
    fn apply(&self, signal: &mut [f64]);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterKind {
    HighPass,
    LowPass,
    Notch,
}

// SECOND ORDER SECTION --------------------------------------------------------

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondOrderFilter {
    b: [f64; 3],
    a: [f64; 3],
}

impl SecondOrderFilter {
    pub fn new(f0: f64, fs: f64, q: f64, kind: FilterKind) -> Self {
        let omega = 2.0 * std::f64::consts::PI * f0 / fs;
        let alpha = f64::sin(omega) / (2.0 * q);
        let cos = f64::cos(omega);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::HighPass => (
                (1.0 + cos) / 2.0,
                -(1.0 + cos),
                (1.0 + cos) / 2.0,
                1.0 + alpha,
                -2.0 * cos,
                1.0 - alpha,
            ),
            FilterKind::LowPass => (
                (1.0 - cos) / 2.0,
                1.0 - cos,
                (1.0 - cos) / 2.0,
                1.0 + alpha,
                -2.0 * cos,
                1.0 - alpha,
            ),
            FilterKind::Notch => (1.0, -2.0 * cos, 1.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha),
        };

        SecondOrderFilter {
            b: [b0 / a0, b1 / a0, b2 / a0],
            a: [1.0, a1 / a0, a2 / a0],
        }
    }

    pub fn dc_gain(&self) -> f64 {
        let den = self.a.iter().sum::<f64>();
        if den.abs() < f64::EPSILON {
            0.0
        } else {
            self.b.iter().sum::<f64>() / den
        }
    }

    /// Filters `signal` in place, starting from the steady state for a constant `signal[0]` input.
    fn run(&self, signal: &mut [f64]) {
        let Some(&first) = signal.first() else {
            return;
        };
        let steady = self.dc_gain() * first;
        let mut x = [first, first];
        let mut y = [steady, steady];

        for sample in signal.iter_mut() {
            let input = *sample;
            let output = self.b[0] * input + self.b[1] * x[0] + self.b[2] * x[1]
                - self.a[1] * y[0]
                - self.a[2] * y[1];

            x[1] = x[0];
            x[0] = input;
            y[1] = y[0];
            y[0] = output;

            *sample = output;
        }
    }
}

// CASCADE ---------------------------------------------------------------------

/// Butterworth Q factors for the second-order sections of an even-order filter.
pub fn butterworth_q(order: usize) -> Vec<f64> {
    (1..=order / 2)
        .map(|k| {
            let theta = std::f64::consts::PI * (2 * k - 1) as f64 / (2 * order) as f64;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Cascade {
    sections: Vec<SecondOrderFilter>,
}

impl Cascade {
    pub fn new(sections: Vec<SecondOrderFilter>) -> Self {
        Self { sections }
    }

    pub fn extend(&mut self, other: Cascade) {
        self.sections.extend(other.sections);
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    fn run(&self, signal: &mut [f64]) {
        for section in &self.sections {
            section.run(signal);
        }
    }

    /// Forward-backward pass with odd reflection padding at both edges.
    pub fn filtfilt(&self, signal: &mut [f64]) {
        let n = signal.len();
        if n == 0 || self.sections.is_empty() {
            return;
        }
        let padlen = (3 * (2 * self.sections.len() + 1)).min(n - 1);

        let mut padded = Vec::with_capacity(n + 2 * padlen);
        let first = signal[0];
        let last = signal[n - 1];
        padded.extend((1..=padlen).rev().map(|i| 2.0 * first - signal[i]));
        padded.extend_from_slice(signal);
        padded.extend((1..=padlen).map(|i| 2.0 * last - signal[n - 1 - i]));

        self.run(&mut padded);
        padded.reverse();
        self.run(&mut padded);
        padded.reverse();

        signal.copy_from_slice(&padded[padlen..padlen + n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_order_butterworth_q() {
        let q = butterworth_q(2);
        assert_eq!(q.len(), 1);
        assert!((q[0] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert_eq!(butterworth_q(6).len(), 3);
    }

    #[test]
    fn lowpass_passes_dc() {
        let section = SecondOrderFilter::new(10.0, 250.0, 0.707, FilterKind::LowPass);
        assert!((section.dc_gain() - 1.0).abs() < 1e-12);
        let mut signal = vec![3.0; 64];
        Cascade::new(vec![section]).filtfilt(&mut signal);
        assert!(signal.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn highpass_blocks_dc() {
        let section = SecondOrderFilter::new(10.0, 250.0, 0.707, FilterKind::HighPass);
        assert!(section.dc_gain().abs() < 1e-12);
        let mut signal = vec![5.0; 128];
        Cascade::new(vec![section]).filtfilt(&mut signal);
        assert!(signal.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn filtfilt_keeps_length() {
        let cascade = Cascade::new(vec![SecondOrderFilter::new(
            40.0,
            250.0,
            0.707,
            FilterKind::LowPass,
        )]);
        for n in [1usize, 2, 5, 300] {
            let mut signal: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
            cascade.filtfilt(&mut signal);
            assert_eq!(signal.len(), n);
            assert!(signal.iter().all(|v| v.is_finite()));
        }
    }
}
