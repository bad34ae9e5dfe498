// src/visualization/plotter.rs

use std::collections::VecDeque;

use crate::feedback::Frame;

/// Rolling history of target and smoothed confidence, keyed by frame time.
pub struct ConfidenceTrace {
    capacity: usize,
    target: VecDeque<(f64, f64)>,
    smoothed: VecDeque<(f64, f64)>,
    last_tick: Option<u64>,
}

impl ConfidenceTrace {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            target: VecDeque::with_capacity(capacity),
            smoothed: VecDeque::with_capacity(capacity),
            last_tick: None,
        }
    }

    /// Records a frame once; repeated polls of the same tick are ignored.
    pub fn add_frame(&mut self, frame: &Frame) -> bool {
        if self.last_tick == Some(frame.tick) {
            return false;
        }
        self.last_tick = Some(frame.tick);

        for (buffer, value) in [
            (&mut self.target, frame.target),
            (&mut self.smoothed, frame.smoothed),
        ] {
            buffer.push_back((frame.elapsed_seconds, value));
            if buffer.len() > self.capacity {
                buffer.pop_front();
            }
        }
        true
    }

    pub fn target_points(&self) -> Vec<[f64; 2]> {
        self.target.iter().map(|&(t, v)| [t, v]).collect()
    }

    pub fn smoothed_points(&self) -> Vec<[f64; 2]> {
        self.smoothed.iter().map(|&(t, v)| [t, v]).collect()
    }

    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn clear(&mut self) {
        self.target.clear();
        self.smoothed.clear();
        self.last_tick = None;
    }
}
