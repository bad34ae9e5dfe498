// src/visualization/mod.rs

pub mod cues;
pub mod plotter;
pub mod window;

use serde::{Deserialize, Serialize};

pub use cues::CueWindow;
pub use window::FeedbackWindow;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VisualizationConfig {
    pub enabled: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Points kept in the confidence trace.
    pub buffer_size: usize,
    pub show_trace: bool,
    pub plot_height: u32,
    /// Show a slider that overrides the classifier's confidence.
    pub allow_manual_override: bool,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_width: 640,
            window_height: 860,
            buffer_size: 600,
            show_trace: true,
            plot_height: 160,
            allow_manual_override: true,
        }
    }
}
