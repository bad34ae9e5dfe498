// src/recording/recorder.rs

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::Recording;
use crate::acquisition::{Board, StreamingSession};
use crate::error::{PipelineError, Result};
use crate::utils::log::Logger;

const STAGE: &str = "recorder";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecorderConfig {
    pub window_seconds: f64,
    pub baseline_trials: usize,
    pub intent_trials: usize,
    pub settle_seconds: f64,
    /// Extra wait after the intent cue so the keypress is not part of the trial.
    pub cue_lead_seconds: f64,
    /// Image shown during the idle block; black when unset.
    #[serde(default)]
    pub idle_cue: Option<PathBuf>,
    /// Image shown during intent trials; a generated hexagon when unset.
    #[serde(default)]
    pub intent_cue: Option<PathBuf>,
    #[serde(default = "default_cue_side")]
    pub cue_side: u32,
}

fn default_cue_side() -> u32 {
    512
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            window_seconds: 10.0,
            baseline_trials: 3,
            intent_trials: 3,
            settle_seconds: 2.0,
            cue_lead_seconds: 1.0,
            idle_cue: None,
            intent_cue: None,
            cue_side: default_cue_side(),
        }
    }
}

/// What the subject sees while a trial is captured.
pub trait StimulusDisplay {
    fn show_idle(&mut self) -> Result<()>;
    fn show_intent(&mut self) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

/// Blocks until the operator is ready.
pub trait Prompt {
    fn wait_for_operator(&mut self, message: &str) -> Result<()>;
}

/// Prints the cues to the terminal, for headless sessions.
pub struct ConsoleStimulus;

impl StimulusDisplay for ConsoleStimulus {
    fn show_idle(&mut self) -> Result<()> {
        println!("{}", "[ blank ]  stay idle".white().bold());
        Ok(())
    }

    fn show_intent(&mut self) -> Result<()> {
        println!("{}", "[ FIREBALL ]  think: push the button".red().bold());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        println!();
        Ok(())
    }
}

/// Waits for Enter on stdin.
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn wait_for_operator(&mut self, message: &str) -> Result<()> {
        print!("{} ", message);
        io::stdout()
            .flush()
            .map_err(|e| PipelineError::io("<stdout>", e))?;
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| PipelineError::io("<stdin>", e))?;
        Ok(())
    }
}

pub struct Recorder {
    config: RecorderConfig,
    logger: Logger,
}

impl Recorder {
    pub fn new(config: RecorderConfig, logger: Logger) -> Result<Self> {
        if config.window_seconds <= 0.0 {
            return Err(PipelineError::invalid(STAGE, "window_seconds must be positive"));
        }
        if config.settle_seconds < 0.0 || config.cue_lead_seconds < 0.0 {
            return Err(PipelineError::invalid(STAGE, "waits cannot be negative"));
        }
        if config.baseline_trials + config.intent_trials == 0 {
            return Err(PipelineError::invalid(STAGE, "nothing to record"));
        }
        Ok(Self { config, logger })
    }

    /// Runs the idle block, then the intent trials, and returns the captured session.
    /// The stream is stopped and released whether or not recording succeeds.
    pub fn record(
        &self,
        board: &mut dyn Board,
        display: &mut dyn StimulusDisplay,
        prompt: &mut dyn Prompt,
    ) -> Result<Recording> {
        let descriptor = board.descriptor().clone();
        let samples = (descriptor.sampling_rate as f64 * self.config.window_seconds).round() as usize;
        let trial = Duration::from_secs_f64(self.config.window_seconds);

        let mut session = StreamingSession::open(board)?;
        self.logger.info(
            STAGE,
            &format!(
                "streaming from {} at {} Hz, {} samples per trial",
                descriptor.name, descriptor.sampling_rate, samples
            ),
        );

        self.logger.info(STAGE, &format!("get ready in {} seconds", self.config.settle_seconds));
        thread::sleep(Duration::from_secs_f64(self.config.settle_seconds));

        prompt.wait_for_operator("Get ready to think about anything else. Press enter to continue")?;
        self.logger.info(
            STAGE,
            &format!(
                "be idle for {} seconds",
                self.config.baseline_trials as f64 * self.config.window_seconds
            ),
        );
        session.board().set_intent(false);
        display.show_idle()?;
        let mut baseline = Vec::with_capacity(self.config.baseline_trials);
        for i in 0..self.config.baseline_trials {
            thread::sleep(trial);
            baseline.push(take_trial(&mut session, samples)?);
            self.logger.debug(STAGE, &format!("baseline trial {} captured", i + 1));
        }
        display.clear()?;

        let mut intent = Vec::with_capacity(self.config.intent_trials);
        for i in 0..self.config.intent_trials {
            prompt.wait_for_operator("Get ready to think about fireballs. Press enter to continue")?;
            self.logger.info(
                STAGE,
                &format!("think push a button for {} seconds", self.config.window_seconds),
            );
            session.board().set_intent(true);
            display.show_intent()?;
            thread::sleep(trial + Duration::from_secs_f64(self.config.cue_lead_seconds));
            display.clear()?;
            intent.push(take_trial(&mut session, samples)?);
            session.board().set_intent(false);
            self.logger.debug(STAGE, &format!("intent trial {} captured", i + 1));
        }

        session.close()?;

        Recording::new(
            descriptor.board_id,
            descriptor.sampling_rate,
            self.config.window_seconds,
            descriptor.eeg_channels,
            intent,
            baseline,
        )
    }
}

fn take_trial(session: &mut StreamingSession<'_>, samples: usize) -> Result<ndarray::Array2<f64>> {
    let data = session.current_board_data(samples)?;
    if data.ncols() < samples {
        return Err(PipelineError::InsufficientData {
            requested: samples,
            available: data.ncols(),
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{SyntheticBoard, SyntheticConfig};

    #[derive(Default)]
    struct Script {
        cues: Vec<&'static str>,
    }

    impl StimulusDisplay for Script {
        fn show_idle(&mut self) -> Result<()> {
            self.cues.push("idle");
            Ok(())
        }
        fn show_intent(&mut self) -> Result<()> {
            self.cues.push("intent");
            Ok(())
        }
        fn clear(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct CountingPrompt(usize);

    impl Prompt for CountingPrompt {
        fn wait_for_operator(&mut self, _message: &str) -> Result<()> {
            self.0 += 1;
            Ok(())
        }
    }

    fn quick() -> RecorderConfig {
        RecorderConfig {
            window_seconds: 0.2,
            settle_seconds: 0.0,
            cue_lead_seconds: 0.05,
            ..RecorderConfig::default()
        }
    }

    #[test]
    fn records_three_and_three_trials() {
        let mut board = SyntheticBoard::new(SyntheticConfig::default()).unwrap();
        let recorder = Recorder::new(quick(), Logger::console_only()).unwrap();
        let mut display = Script::default();
        let mut prompt = CountingPrompt(0);

        let recording = recorder.record(&mut board, &mut display, &mut prompt).unwrap();

        assert_eq!(recording.baseline_trials().len(), 3);
        assert_eq!(recording.intent_trials().len(), 3);
        for t in recording.baseline_trials().iter().chain(recording.intent_trials()) {
            assert_eq!(t.dim(), (32, 50));
        }
        assert_eq!(display.cues, vec!["idle", "intent", "intent", "intent"]);
        assert_eq!(prompt.0, 4);
        assert_eq!(recording.window_seconds(), 0.2);
    }

    #[test]
    fn image_stimulus_ends_each_block_blank() {
        use crate::recording::stimulus::{Cue, ImageStimulus};

        let mut board = SyntheticBoard::new(SyntheticConfig::default()).unwrap();
        let config = RecorderConfig {
            baseline_trials: 1,
            intent_trials: 2,
            cue_side: 8,
            ..quick()
        };
        let recorder = Recorder::new(config.clone(), Logger::console_only()).unwrap();
        let mut stimulus = ImageStimulus::from_config(&config).unwrap();
        let view = stimulus.view();

        let recording = recorder
            .record(&mut board, &mut stimulus, &mut CountingPrompt(0))
            .unwrap();

        assert_eq!(recording.intent_trials().len(), 2);
        // idle + clear, then show + clear per intent trial
        assert_eq!(view.current(), (Cue::Blank, 6));
    }

    #[test]
    fn rejects_empty_protocol() {
        let config = RecorderConfig {
            baseline_trials: 0,
            intent_trials: 0,
            ..quick()
        };
        assert!(Recorder::new(config, Logger::console_only()).is_err());
    }
}
