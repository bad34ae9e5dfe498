// src/feedback/mod.rs

pub mod pixelate;
pub mod render_loop;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

pub use pixelate::Pixelator;
pub use render_loop::{Canvas, Frame, FrameSlot, RenderLoop};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeedbackConfig {
    /// Edge length of the square feedback image, in pixels.
    pub side: u32,
    pub tick_seconds: f64,
    pub smoothing_weight: f64,
    pub initial_confidence: f64,
    /// Stimulus image; a generated hexagon is used when unset.
    pub stimulus_path: Option<PathBuf>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            side: 600,
            tick_seconds: 1.0 / 60.0,
            smoothing_weight: 0.3,
            initial_confidence: 1.0,
            stimulus_path: None,
        }
    }
}

/// Lock-free single-value handoff between the inference thread and the render loop.
///
/// Stores an `f64` as its bit pattern. Writes are clamped to `[0, 1]`; NaN is ignored.
#[derive(Debug)]
pub struct ConfidenceCell {
    bits: AtomicU64,
}

impl ConfidenceCell {
    pub fn new(initial: f64) -> Self {
        Self {
            bits: AtomicU64::new(clamp_unit(initial).unwrap_or(0.0).to_bits()),
        }
    }

    pub fn store(&self, value: f64) {
        if let Some(v) = clamp_unit(value) {
            self.bits.store(v.to_bits(), Ordering::Release);
        }
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for ConfidenceCell {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Slider-driven confidence owned by the feedback window.
///
/// While engaged it replaces the inference target as the render loop's input. The
/// inference cell keeps its own single writer either way.
#[derive(Debug, Default)]
pub struct ManualOverride {
    engaged: AtomicBool,
    value: ConfidenceCell,
}

impl ManualOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.value.store(value);
    }

    pub fn engage(&self, engaged: bool) {
        self.engaged.store(engaged, Ordering::Release);
    }

    pub fn value(&self) -> f64 {
        self.value.load()
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    /// The render input: the manual value while engaged, `inferred` otherwise.
    pub fn resolve(&self, inferred: f64) -> f64 {
        if self.is_engaged() {
            self.value.load()
        } else {
            inferred
        }
    }
}

fn clamp_unit(value: f64) -> Option<f64> {
    if value.is_nan() {
        None
    } else {
        Some(value.clamp(0.0, 1.0))
    }
}

/// Exponential low-pass on the displayed confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Smoother {
    weight: f64,
    value: f64,
}

impl Smoother {
    pub fn new(weight: f64, initial: f64) -> Self {
        Self {
            weight: weight.clamp(0.0, 1.0),
            value: initial,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// `value <- target * w + value * (1 - w)`
    pub fn step(&mut self, target: f64) -> f64 {
        self.value = target * self.weight + self.value * (1.0 - self.weight);
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ten_ticks_towards_one() {
        let w = 0.3;
        let mut smoother = Smoother::new(w, 0.0);
        for _ in 0..10 {
            smoother.step(1.0);
        }
        let expected = 1.0 - (1.0f64 - w).powi(10);
        assert!((smoother.value() - expected).abs() < 1e-12);
    }

    #[test]
    fn holds_steady_at_target() {
        let mut smoother = Smoother::new(0.3, 0.4);
        for _ in 0..5 {
            assert!((smoother.step(0.4) - 0.4).abs() < 1e-15);
        }
    }

    #[test]
    fn cell_clamps_and_ignores_nan() {
        let cell = ConfidenceCell::new(0.5);
        cell.store(1.7);
        assert_eq!(cell.load(), 1.0);
        cell.store(f64::NAN);
        assert_eq!(cell.load(), 1.0);
        cell.store(-0.2);
        assert_eq!(cell.load(), 0.0);
    }

    #[test]
    fn manual_override_wins_only_while_engaged() {
        let manual = ManualOverride::new();
        manual.set(0.2);
        assert_eq!(manual.resolve(0.9), 0.9);
        manual.engage(true);
        assert_eq!(manual.resolve(0.9), 0.2);
        manual.engage(false);
        assert_eq!(manual.resolve(0.9), 0.9);
    }

    #[test]
    fn cell_is_visible_across_threads() {
        let cell = Arc::new(ConfidenceCell::default());
        let writer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || cell.store(0.75))
        };
        writer.join().unwrap();
        assert_eq!(cell.load(), 0.75);
    }
}
