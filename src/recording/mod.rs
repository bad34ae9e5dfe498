// src/recording/mod.rs

pub mod recorder;
pub mod stimulus;

use std::fs;
use std::path::Path;

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::codec::{BASELINE, INTENT};

pub use recorder::{ConsolePrompt, ConsoleStimulus, Prompt, Recorder, RecorderConfig, StimulusDisplay};
pub use stimulus::{Cue, CueImages, CueView, ImageStimulus};

/// One acquisition session: idle and intent trials captured from the same board.
///
/// Only constructed through validation, so every trial has the same row count and
/// every EEG row index is in range.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    board_id: i32,
    sampling_rate_hz: u32,
    window_seconds: f64,
    eeg_channels: Vec<usize>,
    intent_trials: Vec<Array2<f64>>,
    baseline_trials: Vec<Array2<f64>>,
}

// On-disk layout. New layouts get a new variant.
#[derive(Serialize, Deserialize)]
#[serde(tag = "version")]
enum RecordingFile {
    #[serde(rename = "v1")]
    V1(RecordingV1),
}

#[derive(Serialize, Deserialize)]
struct RecordingV1 {
    board_id: i32,
    sampling_rate_hz: u32,
    window_seconds: f64,
    eeg_channels: Vec<usize>,
    intent_trials: Vec<Array2<f64>>,
    baseline_trials: Vec<Array2<f64>>,
}

impl Recording {
    pub fn new(
        board_id: i32,
        sampling_rate_hz: u32,
        window_seconds: f64,
        eeg_channels: Vec<usize>,
        intent_trials: Vec<Array2<f64>>,
        baseline_trials: Vec<Array2<f64>>,
    ) -> Result<Self> {
        let malformed = |msg: String| Err(PipelineError::MalformedRecording(msg));

        if sampling_rate_hz == 0 {
            return malformed("sampling rate is zero".to_string());
        }
        if !(window_seconds > 0.0 && window_seconds.is_finite()) {
            return malformed(format!("window_seconds {} is not positive", window_seconds));
        }
        if eeg_channels.is_empty() {
            return malformed("no EEG channels listed".to_string());
        }
        let rows = match intent_trials.iter().chain(&baseline_trials).next() {
            Some(first) => first.nrows(),
            None => return malformed("recording has no trials".to_string()),
        };
        if let Some(bad) = intent_trials
            .iter()
            .chain(&baseline_trials)
            .find(|t| t.nrows() != rows)
        {
            return malformed(format!("trial has {} rows, expected {}", bad.nrows(), rows));
        }
        if let Some(&bad) = eeg_channels.iter().find(|&&c| c >= rows) {
            return malformed(format!("EEG row {} outside {} board rows", bad, rows));
        }

        Ok(Self {
            board_id,
            sampling_rate_hz,
            window_seconds,
            eeg_channels,
            intent_trials,
            baseline_trials,
        })
    }

    pub fn board_id(&self) -> i32 {
        self.board_id
    }

    pub fn sampling_rate(&self) -> u32 {
        self.sampling_rate_hz
    }

    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    pub fn eeg_channels(&self) -> &[usize] {
        &self.eeg_channels
    }

    pub fn intent_trials(&self) -> &[Array2<f64>] {
        &self.intent_trials
    }

    pub fn baseline_trials(&self) -> &[Array2<f64>] {
        &self.baseline_trials
    }

    /// Every trial's EEG rows with its class label, intent trials first.
    pub fn labelled_eeg(&self) -> Vec<(&'static str, Array2<f64>)> {
        let intent = self.intent_trials.iter().map(|t| (INTENT, t));
        let baseline = self.baseline_trials.iter().map(|t| (BASELINE, t));
        intent
            .chain(baseline)
            .map(|(label, t)| (label, t.select(Axis(0), &self.eeg_channels)))
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let file: RecordingFile = serde_json::from_str(&text)
            .map_err(|e| PipelineError::MalformedRecording(format!("{}: {}", path.display(), e)))?;
        match file {
            RecordingFile::V1(v) => Self::new(
                v.board_id,
                v.sampling_rate_hz,
                v.window_seconds,
                v.eeg_channels,
                v.intent_trials,
                v.baseline_trials,
            ),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
        }
        let file = RecordingFile::V1(RecordingV1 {
            board_id: self.board_id,
            sampling_rate_hz: self.sampling_rate_hz,
            window_seconds: self.window_seconds,
            eeg_channels: self.eeg_channels.clone(),
            intent_trials: self.intent_trials.clone(),
            baseline_trials: self.baseline_trials.clone(),
        });
        let json = serde_json::to_string(&file)?;
        fs::write(path, json).map_err(|e| PipelineError::io(path, e))
    }
}
