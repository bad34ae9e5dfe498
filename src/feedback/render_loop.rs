// src/feedback/render_loop.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use image::RgbaImage;

use super::{ConfidenceCell, FeedbackConfig, ManualOverride, Pixelator, Smoother};
use crate::error::{PipelineError, Result};
use crate::utils::log::Logger;

const STAGE: &str = "render_loop";

/// One painted tick.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    pub target: f64,
    pub smoothed: f64,
    pub tick: u64,
    pub elapsed_seconds: f64,
}

/// Where frames go. Released when the loop exits.
pub trait Canvas: Send {
    fn paint(&mut self, frame: &Frame) -> Result<()>;
}

/// Latest-frame mailbox shared with the window thread.
pub type FrameSlot = Arc<Mutex<Option<Frame>>>;

impl Canvas for FrameSlot {
    fn paint(&mut self, frame: &Frame) -> Result<()> {
        let mut slot = self
            .lock()
            .map_err(|_| PipelineError::invalid(STAGE, "frame slot poisoned"))?;
        *slot = Some(frame.clone());
        Ok(())
    }
}

/// Smooths the shared target (or the engaged manual override) and paints a pixelated frame every tick on its own thread.
pub struct RenderLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Smoother>>,
}

impl RenderLoop {
    pub fn spawn(
        config: &FeedbackConfig,
        pixelator: Pixelator,
        target: Arc<ConfidenceCell>,
        manual: Arc<ManualOverride>,
        mut canvas: Box<dyn Canvas>,
        logger: Logger,
    ) -> Result<Self> {
        if !(config.tick_seconds > 0.0 && config.tick_seconds.is_finite()) {
            return Err(PipelineError::invalid(STAGE, "tick_seconds must be positive"));
        }
        let tick = Duration::from_secs_f64(config.tick_seconds);
        let mut smoother = Smoother::new(config.smoothing_weight, config.initial_confidence);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("render-loop".to_string())
            .spawn(move || {
                let started = Instant::now();
                let mut count: u64 = 0;
                let mut failures: u64 = 0;
                while !stop_flag.load(Ordering::Acquire) {
                    let frame_started = Instant::now();
                    let goal = manual.resolve(target.load());
                    let smoothed = smoother.step(goal);
                    let frame = Frame {
                        image: pixelator.frame(smoothed),
                        target: goal,
                        smoothed,
                        tick: count,
                        elapsed_seconds: started.elapsed().as_secs_f64(),
                    };
                    if let Err(e) = canvas.paint(&frame) {
                        failures += 1;
                        // first failure and then every few seconds
                        if failures == 1 || failures % 300 == 0 {
                            logger.warn(STAGE, &format!("paint failed ({} so far): {}", failures, e));
                        }
                    }
                    count += 1;
                    if let Some(rest) = tick.checked_sub(frame_started.elapsed()) {
                        thread::sleep(rest);
                    }
                }
                logger.debug(STAGE, &format!("stopped after {} ticks", count));
                drop(canvas);
                smoother
            })
            .map_err(|e| PipelineError::io("render-loop thread", e))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the loop and waits for it; returns the final smoothed value.
    pub fn stop(mut self) -> Option<f64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Option<f64> {
        self.stop.store(true, Ordering::Release);
        self.handle
            .take()
            .and_then(|h| h.join().ok())
            .map(|s| s.value())
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
