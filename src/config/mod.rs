// src/config/mod.rs

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::acquisition::{sampling_rate, SyntheticConfig, SYNTHETIC_BOARD};
use crate::error::{PipelineError, Result};
use crate::feedback::FeedbackConfig;
use crate::live::LiveConfig;
use crate::recording::RecorderConfig;
use crate::training::TrainingConfig;
use crate::utils::log::LoggingConfig;
use crate::visualization::VisualizationConfig;

/// Every tunable of the application. Sections missing from the YAML take their defaults.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub board: BoardConfig,
    pub paths: PathsConfig,
    pub recorder: RecorderConfig,
    pub training: TrainingConfig,
    pub live: LiveConfig,
    pub feedback: FeedbackConfig,
    pub visualization: VisualizationConfig,
}

impl Config {
    /// Defaults for `board_id`, with the band-pass fitted under the board's Nyquist frequency.
    pub fn for_board(board_id: i32) -> Result<Self> {
        let fs = sampling_rate(board_id)?;
        let mut config = Config::default();
        config.board.board_id = board_id;
        config.training.preprocess = config.training.preprocess.for_sampling_rate(fs);
        Ok(config)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BoardConfig {
    pub board_id: i32,
    pub synthetic: SyntheticConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            board_id: SYNTHETIC_BOARD,
            synthetic: SyntheticConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PathsConfig {
    pub recording: PathBuf,
    pub bundle: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            recording: PathBuf::from("recorded_eeg.json"),
            bundle: PathBuf::from("model/intent_bundle.json"),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(serde_yaml::from_str(&config_str)?)
}

pub fn save_config<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let path = path.as_ref();
    let yaml = serde_yaml::to_string(config)?;
    fs::write(path, yaml).map_err(|e| PipelineError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_survive_a_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        save_config(&Config::default(), &path).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.training, TrainingConfig::default());
        assert_eq!(loaded.feedback, FeedbackConfig::default());
        assert_eq!(loaded.board.board_id, SYNTHETIC_BOARD);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "board:\n  board_id: 0\n  synthetic:\n    seed: 1\n    noise_amplitude: 1.0\n    alpha_amplitude: 1.0\n    gamma_amplitude: 1.0\n    intent_amplitude: 1.0\n    intent_frequency_hz: 70.0\n    buffer_seconds: 10.0\n    wall_clock: true\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.board.board_id, 0);
        assert_eq!(config.recorder, RecorderConfig::default());
    }

    #[test]
    fn board_defaults_build_a_preprocessor_at_the_board_rate() {
        use crate::acquisition::{CYTON_BOARD, CYTON_DAISY_BOARD, GANGLION_BOARD};
        use crate::processing::preprocessor::ChannelPreprocessor;

        // 30-100 Hz does not fit under a 100 Hz or 62.5 Hz Nyquist
        assert!(ChannelPreprocessor::new(&TrainingConfig::default().preprocess, 200).is_err());

        for board in [SYNTHETIC_BOARD, CYTON_BOARD, GANGLION_BOARD, CYTON_DAISY_BOARD] {
            let config = Config::for_board(board).unwrap();
            let fs = sampling_rate(board).unwrap();
            assert_eq!(config.board.board_id, board);
            assert!(ChannelPreprocessor::new(&config.training.preprocess, fs).is_ok());
        }
        assert_eq!(Config::for_board(SYNTHETIC_BOARD).unwrap().training, TrainingConfig::default());
        assert!(Config::for_board(57).is_err());
    }

    #[test]
    fn broken_yaml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "training: [not, a, map").unwrap();
        assert!(matches!(load_config(&path), Err(PipelineError::Config(_))));
        assert!(matches!(
            load_config(dir.path().join("missing.yaml")),
            Err(PipelineError::Io { .. })
        ));
    }
}
