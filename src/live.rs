// src/live.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acquisition::{Board, StreamingSession};
use crate::error::{PipelineError, Result};
use crate::feedback::ConfidenceCell;
use crate::model::bundle::{InferenceModel, Prediction};
use crate::model::codec::INTENT;
use crate::utils::log::Logger;

const STAGE: &str = "live";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceSource {
    /// Probability of whichever class won.
    #[default]
    MaxProbability,
    /// Probability of the intent class, whether or not it won.
    IntentProbability,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LiveConfig {
    pub poll_interval_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive non-retryable failures tolerated before the worker gives up.
    pub max_consecutive_failures: u32,
    pub confidence_source: ConfidenceSource,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            backoff_initial_ms: 10,
            backoff_max_ms: 250,
            max_consecutive_failures: 20,
            confidence_source: ConfidenceSource::MaxProbability,
        }
    }
}

/// Doubling retry delay with a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Consecutive failure counter with a fixed limit.
#[derive(Debug, Clone)]
pub struct FailureBudget {
    limit: u32,
    consecutive: u32,
}

impl FailureBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, consecutive: 0 }
    }

    /// Counts one failure; false once the limit is exceeded.
    pub fn record(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive <= self.limit
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Counters reported when the worker exits.
#[derive(Debug, Clone, Default)]
pub struct LiveStats {
    pub predictions: u64,
    pub retries: u64,
    pub last: Option<Prediction>,
}

pub fn confidence_of(prediction: &Prediction, source: ConfidenceSource, intent_index: Option<usize>) -> f64 {
    match (source, intent_index) {
        (ConfidenceSource::IntentProbability, Some(i)) => prediction.probabilities[i],
        _ => prediction.confidence,
    }
}

/// Worker thread: newest window from the board, through the model, into the confidence cell.
pub struct LiveInference {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<LiveStats>>>,
}

impl LiveInference {
    pub fn spawn(
        mut board: Box<dyn Board>,
        mut model: InferenceModel,
        target: Arc<ConfidenceCell>,
        config: LiveConfig,
        logger: Logger,
    ) -> Result<Self> {
        let descriptor = board.descriptor().clone();
        let spec = model.spec().clone();
        if descriptor.sampling_rate != spec.sampling_rate {
            return Err(PipelineError::invalid(
                STAGE,
                format!(
                    "board streams at {} Hz but the model was trained at {} Hz",
                    descriptor.sampling_rate, spec.sampling_rate
                ),
            ));
        }
        if descriptor.eeg_channels.len() != spec.channel_count {
            return Err(PipelineError::DimensionMismatch {
                stage: STAGE,
                expected: spec.channel_count,
                actual: descriptor.eeg_channels.len(),
            });
        }
        if config.backoff_initial_ms == 0 || config.backoff_max_ms < config.backoff_initial_ms {
            return Err(PipelineError::invalid(STAGE, "backoff must start above zero and not exceed its maximum"));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let intent_index = model.codec().encode(INTENT).ok();

        let handle = thread::Builder::new()
            .name("live-inference".to_string())
            .spawn(move || {
                let mut session = StreamingSession::open(board.as_mut())?;
                let mut backoff = Backoff::new(
                    Duration::from_millis(config.backoff_initial_ms),
                    Duration::from_millis(config.backoff_max_ms),
                );
                let mut budget = FailureBudget::new(config.max_consecutive_failures);
                let poll = Duration::from_millis(config.poll_interval_ms);
                let mut stats = LiveStats::default();
                logger.info(STAGE, &format!("streaming from {}", descriptor.name));

                while !stop_flag.load(Ordering::Acquire) {
                    let outcome = session
                        .eeg_window(spec.window_samples)
                        .and_then(|window| model.infer(window));
                    match outcome {
                        Ok(prediction) => {
                            target.store(confidence_of(&prediction, config.confidence_source, intent_index));
                            logger.debug(
                                STAGE,
                                &format!("{} ({:.3})", prediction.label, prediction.confidence),
                            );
                            stats.predictions += 1;
                            stats.last = Some(prediction);
                            backoff.reset();
                            budget.reset();
                            thread::sleep(poll);
                        }
                        Err(e) if e.is_retryable() => {
                            stats.retries += 1;
                            thread::sleep(backoff.next_delay());
                        }
                        Err(e @ PipelineError::AcquisitionFailure { .. }) => {
                            logger.error(STAGE, &e.to_string());
                            return Err(e);
                        }
                        Err(e) => {
                            if !budget.record() {
                                logger.error(
                                    STAGE,
                                    &format!("giving up after {} failed windows: {}", budget.consecutive(), e),
                                );
                                return Err(e);
                            }
                            // keep the last confidence on screen
                            logger.warn(STAGE, &format!("window skipped: {}", e));
                            thread::sleep(backoff.next_delay());
                        }
                    }
                }

                session.close()?;
                logger.info(
                    STAGE,
                    &format!("stopped after {} predictions, {} retries", stats.predictions, stats.retries),
                );
                Ok(stats)
            })
            .map_err(|e| PipelineError::io("live-inference thread", e))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(mut self) -> Result<LiveStats> {
        self.stop.store(true, Ordering::Release);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PipelineError::invalid(STAGE, "inference thread panicked"))?,
            None => Ok(LiveStats::default()),
        }
    }
}

impl Drop for LiveInference {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
