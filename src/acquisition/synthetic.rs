// src/acquisition/synthetic.rs

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::time::Instant;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{Board, BoardDescriptor, SYNTHETIC_BOARD};
use crate::error::{PipelineError, Result};
use crate::recording::Recording;

// -----------------------------------------------------------------------------
// SETUP FOR THE SIMULATED SIGNALS
// -----------------------------------------------------------------------------

const ALPHA_FREQ: f64 = 10.0;
const GAMMA_FREQ: f64 = 40.0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub noise_amplitude: f64,
    pub alpha_amplitude: f64,
    pub gamma_amplitude: f64,
    /// Extra oscillation added to every EEG row while the intent stimulus is shown.
    pub intent_amplitude: f64,
    pub intent_frequency_hz: f64,
    /// When set, intent switches on and off every this many seconds of stream time.
    pub intent_cycle_seconds: Option<f64>,
    pub buffer_seconds: f64,
    /// Generate samples as wall-clock time passes. When false, only `advance` adds samples.
    pub wall_clock: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            noise_amplitude: 4.0,
            alpha_amplitude: 10.0,
            gamma_amplitude: 1.5,
            intent_amplitude: 6.0,
            intent_frequency_hz: 70.0,
            intent_cycle_seconds: None,
            buffer_seconds: 60.0,
            wall_clock: true,
        }
    }
}

// -----------------------------------------------------------------------------
// SYNTHETIC BOARD
// -----------------------------------------------------------------------------

/// Deterministic stand-in for a real headset, laid out like the synthetic board id.
pub struct SyntheticBoard {
    descriptor: BoardDescriptor,
    config: SyntheticConfig,
    rng: StdRng,
    phases: Vec<f64>,
    rows: Vec<VecDeque<f64>>,
    generated: u64,
    started_at: Option<Instant>,
    prepared: bool,
    intent: bool,
}

impl SyntheticBoard {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        let descriptor = BoardDescriptor::lookup(SYNTHETIC_BOARD)?;
        if config.buffer_seconds <= 0.0 {
            return Err(PipelineError::invalid("synthetic_board", "buffer_seconds must be positive"));
        }
        let mut rng = StdRng::seed_from_u64(config.seed);
        let phases = (0..descriptor.row_count)
            .map(|_| rng.gen_range(0.0..2.0 * PI))
            .collect();
        let rows = vec![VecDeque::new(); descriptor.row_count];
        Ok(Self {
            descriptor,
            config,
            rng,
            phases,
            rows,
            generated: 0,
            started_at: None,
            prepared: false,
            intent: false,
        })
    }

    fn capacity(&self) -> usize {
        (self.config.buffer_seconds * self.descriptor.sampling_rate as f64).ceil() as usize
    }

    pub fn buffered(&self) -> usize {
        self.rows.first().map_or(0, VecDeque::len)
    }

    /// Appends `samples` columns to the ring buffer.
    pub fn advance(&mut self, samples: usize) {
        let fs = self.descriptor.sampling_rate as f64;
        let last_row = self.descriptor.row_count - 1;
        let capacity = self.capacity();

        for _ in 0..samples {
            let t = self.generated as f64 / fs;
            let cycled = self
                .config
                .intent_cycle_seconds
                .filter(|c| *c > 0.0)
                .is_some_and(|c| (t / c) as u64 % 2 == 1);
            let intent = self.intent || cycled;
            for row in 0..self.descriptor.row_count {
                let value = if row == 0 {
                    (self.generated % 256) as f64
                } else if row == last_row {
                    t
                } else if self.descriptor.eeg_channels.contains(&row) {
                    let phase = self.phases[row];
                    let mut v = self.config.alpha_amplitude * (2.0 * PI * ALPHA_FREQ * t + phase).sin()
                        + self.config.gamma_amplitude * (2.0 * PI * GAMMA_FREQ * t + 2.0 * phase).sin()
                        + self.config.noise_amplitude * self.rng.gen_range(-1.0..1.0);
                    if intent {
                        v += self.config.intent_amplitude
                            * (2.0 * PI * self.config.intent_frequency_hz * t + phase).sin();
                    }
                    v
                } else {
                    0.0
                };
                let buffer = &mut self.rows[row];
                buffer.push_back(value);
                if buffer.len() > capacity {
                    buffer.pop_front();
                }
            }
            self.generated += 1;
        }
    }

    // Catches up with wall-clock time since start.
    fn pump(&mut self) {
        if !self.config.wall_clock {
            return;
        }
        if let Some(started) = self.started_at {
            let due = (started.elapsed().as_secs_f64() * self.descriptor.sampling_rate as f64) as u64;
            if due > self.generated {
                self.advance((due - self.generated) as usize);
            }
        }
    }

    /// Generates a full recording without waiting: idle trials then intent trials.
    pub fn simulate_recording(
        &mut self,
        baseline_trials: usize,
        intent_trials: usize,
        window_seconds: f64,
    ) -> Result<Recording> {
        let samples = (window_seconds * self.descriptor.sampling_rate as f64).round() as usize;
        if samples == 0 || samples > self.capacity() {
            return Err(PipelineError::invalid(
                "synthetic_board",
                format!("cannot simulate {} s trials", window_seconds),
            ));
        }

        let mut baseline = Vec::with_capacity(baseline_trials);
        self.intent = false;
        for _ in 0..baseline_trials {
            self.advance(samples);
            baseline.push(self.latest(samples));
        }
        let mut intent = Vec::with_capacity(intent_trials);
        for _ in 0..intent_trials {
            self.intent = false;
            self.advance(self.descriptor.sampling_rate as usize / 2);
            self.intent = true;
            self.advance(samples);
            intent.push(self.latest(samples));
        }
        self.intent = false;

        Recording::new(
            self.descriptor.board_id,
            self.descriptor.sampling_rate,
            window_seconds,
            self.descriptor.eeg_channels.clone(),
            intent,
            baseline,
        )
    }

    fn latest(&self, samples: usize) -> Array2<f64> {
        let available = self.buffered();
        let m = samples.min(available);
        let start = available - m;
        Array2::from_shape_fn((self.descriptor.row_count, m), |(r, c)| self.rows[r][start + c])
    }
}

impl Board for SyntheticBoard {
    fn descriptor(&self) -> &BoardDescriptor {
        &self.descriptor
    }

    fn prepare(&mut self) -> Result<()> {
        self.prepared = true;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(PipelineError::acquisition("start", "session not prepared"));
        }
        self.started_at = Some(Instant::now());
        self.generated = 0;
        for row in &mut self.rows {
            row.clear();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.pump();
        self.started_at = None;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.prepared = false;
        Ok(())
    }

    fn current_board_data(&mut self, samples: usize) -> Result<Array2<f64>> {
        if !self.prepared {
            return Err(PipelineError::acquisition("current_board_data", "session not prepared"));
        }
        self.pump();
        Ok(self.latest(samples))
    }

    fn set_intent(&mut self, active: bool) {
        self.pump();
        self.intent = active;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual() -> SyntheticBoard {
        SyntheticBoard::new(SyntheticConfig {
            wall_clock: false,
            ..SyntheticConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn same_seed_same_signal() {
        let mut a = manual();
        let mut b = manual();
        a.advance(300);
        b.advance(300);
        assert_eq!(a.latest(300), b.latest(300));
    }

    #[test]
    fn returns_at_most_what_is_buffered() {
        let mut board = manual();
        board.prepare().unwrap();
        board.start().unwrap();
        board.advance(100);
        let data = board.current_board_data(250).unwrap();
        assert_eq!(data.dim(), (32, 100));
        let data = board.current_board_data(40).unwrap();
        assert_eq!(data.ncols(), 40);
        // counter row tracks the sample index
        assert_eq!(data[[0, 39]], 99.0);
    }

    #[test]
    fn ring_buffer_is_bounded() {
        let mut board = SyntheticBoard::new(SyntheticConfig {
            wall_clock: false,
            buffer_seconds: 1.0,
            ..SyntheticConfig::default()
        })
        .unwrap();
        board.advance(600);
        assert_eq!(board.buffered(), 250);
    }

    #[test]
    fn data_before_prepare_is_an_acquisition_failure() {
        let mut board = manual();
        assert!(matches!(
            board.current_board_data(10),
            Err(PipelineError::AcquisitionFailure { .. })
        ));
    }

    #[test]
    fn intent_raises_signal_power() {
        let mut board = manual();
        let eeg = 1;
        board.advance(500);
        let idle: f64 = board.latest(500).row(eeg).iter().map(|v| v * v).sum();
        board.intent = true;
        board.advance(500);
        let active: f64 = board.latest(500).row(eeg).iter().map(|v| v * v).sum();
        assert!(active > idle);
    }

    #[test]
    fn intent_cycle_toggles_with_stream_time() {
        let mut cycling = SyntheticBoard::new(SyntheticConfig {
            wall_clock: false,
            intent_cycle_seconds: Some(1.0),
            ..SyntheticConfig::default()
        })
        .unwrap();
        let mut plain = manual();
        cycling.advance(500);
        plain.advance(500);
        // first second idle in both, second second differs
        assert_eq!(cycling.latest(500).slice(ndarray::s![.., ..250]), plain.latest(500).slice(ndarray::s![.., ..250]));
        assert_ne!(cycling.latest(250), plain.latest(250));
    }

    #[test]
    fn simulated_recording_shapes() {
        let mut board = manual();
        let recording = board.simulate_recording(3, 3, 2.0).unwrap();
        assert_eq!(recording.intent_trials().len(), 3);
        assert_eq!(recording.baseline_trials().len(), 3);
        for trial in recording.intent_trials().iter().chain(recording.baseline_trials()) {
            assert_eq!(trial.dim(), (32, 500));
        }
    }
}
