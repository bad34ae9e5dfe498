// src/recording/stimulus.rs

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use image::{imageops, Rgba, RgbaImage};

use super::recorder::{RecorderConfig, StimulusDisplay};
use crate::error::{PipelineError, Result};
use crate::feedback::pixelate::hexagon_placeholder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Blank,
    Idle,
    Intent,
}

/// Cue images at a common square size.
#[derive(Debug)]
pub struct CueImages {
    blank: RgbaImage,
    idle: RgbaImage,
    intent: RgbaImage,
}

impl CueImages {
    /// Loads the configured cue files; a missing entry falls back to a generated image.
    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        let side = config.cue_side;
        if side == 0 {
            return Err(PipelineError::invalid("stimulus", "cue_side must be positive"));
        }
        let blank = RgbaImage::from_pixel(side, side, Rgba([0, 0, 0, 255]));
        let idle = match &config.idle_cue {
            Some(path) => load_cue(path, side)?,
            None => blank.clone(),
        };
        let intent = match &config.intent_cue {
            Some(path) => load_cue(path, side)?,
            None => hexagon_placeholder(side),
        };
        Ok(Self { blank, idle, intent })
    }

    pub fn get(&self, cue: Cue) -> &RgbaImage {
        match cue {
            Cue::Blank => &self.blank,
            Cue::Idle => &self.idle,
            Cue::Intent => &self.intent,
        }
    }
}

fn load_cue(path: &Path, side: u32) -> Result<RgbaImage> {
    let image = image::open(path)?.to_rgba8();
    if image.dimensions() == (side, side) {
        return Ok(image);
    }
    Ok(imageops::resize(&image, side, side, imageops::FilterType::CatmullRom))
}

#[derive(Debug)]
struct Shown {
    cue: Cue,
    serial: u64,
}

/// Read side shared with the window that paints the cues.
#[derive(Debug, Clone)]
pub struct CueView {
    images: Arc<CueImages>,
    shown: Arc<Mutex<Shown>>,
    finished: Arc<AtomicBool>,
}

impl CueView {
    /// Current cue and a counter that moves on every change.
    pub fn current(&self) -> (Cue, u64) {
        match self.shown.lock() {
            Ok(shown) => (shown.cue, shown.serial),
            Err(poisoned) => {
                let shown = poisoned.into_inner();
                (shown.cue, shown.serial)
            }
        }
    }

    pub fn image(&self, cue: Cue) -> &RgbaImage {
        self.images.get(cue)
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Publishes the blank and fireball images for a window to paint.
#[derive(Debug)]
pub struct ImageStimulus {
    view: CueView,
}

impl ImageStimulus {
    pub fn new(images: CueImages) -> Self {
        Self {
            view: CueView {
                images: Arc::new(images),
                shown: Arc::new(Mutex::new(Shown {
                    cue: Cue::Blank,
                    serial: 0,
                })),
                finished: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Result<Self> {
        Ok(Self::new(CueImages::from_config(config)?))
    }

    pub fn view(&self) -> CueView {
        self.view.clone()
    }

    fn show(&mut self, cue: Cue) -> Result<()> {
        let mut shown = self
            .view
            .shown
            .lock()
            .map_err(|_| PipelineError::invalid("stimulus", "cue slot poisoned"))?;
        shown.cue = cue;
        shown.serial += 1;
        Ok(())
    }
}

impl StimulusDisplay for ImageStimulus {
    fn show_idle(&mut self) -> Result<()> {
        self.show(Cue::Idle)
    }

    fn show_intent(&mut self) -> Result<()> {
        self.show(Cue::Intent)
    }

    fn clear(&mut self) -> Result<()> {
        self.show(Cue::Blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(path: &Path, side: u32, colour: [u8; 4]) {
        RgbaImage::from_pixel(side, side, Rgba(colour)).save(path).unwrap();
    }

    #[test]
    fn configured_cues_are_loaded_and_resized() {
        let dir = tempfile::tempdir().unwrap();
        let idle = dir.path().join("blank.png");
        let intent = dir.path().join("fireball.png");
        solid(&idle, 8, [255, 255, 255, 255]);
        solid(&intent, 8, [200, 40, 0, 255]);

        let config = RecorderConfig {
            idle_cue: Some(idle),
            intent_cue: Some(intent),
            cue_side: 16,
            ..RecorderConfig::default()
        };
        let images = CueImages::from_config(&config).unwrap();

        assert_eq!(images.get(Cue::Idle).dimensions(), (16, 16));
        assert_eq!(images.get(Cue::Idle).get_pixel(3, 3), &Rgba([255, 255, 255, 255]));
        assert_eq!(images.get(Cue::Intent).get_pixel(8, 8), &Rgba([200, 40, 0, 255]));
        assert!(images.get(Cue::Blank).pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn missing_cue_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecorderConfig {
            intent_cue: Some(dir.path().join("fireball.png")),
            ..RecorderConfig::default()
        };
        assert!(CueImages::from_config(&config).is_err());
        assert!(CueImages::from_config(&RecorderConfig {
            cue_side: 0,
            ..RecorderConfig::default()
        })
        .is_err());
    }

    #[test]
    fn display_calls_move_the_shared_cue() {
        let config = RecorderConfig {
            cue_side: 12,
            ..RecorderConfig::default()
        };
        let mut stimulus = ImageStimulus::from_config(&config).unwrap();
        let view = stimulus.view();
        assert_eq!(view.current(), (Cue::Blank, 0));

        stimulus.show_idle().unwrap();
        assert_eq!(view.current(), (Cue::Idle, 1));
        stimulus.show_intent().unwrap();
        assert_eq!(view.current(), (Cue::Intent, 2));
        assert_eq!(view.image(Cue::Intent), &hexagon_placeholder(12));
        stimulus.clear().unwrap();
        assert_eq!(view.current(), (Cue::Blank, 3));

        assert!(!view.is_finished());
        view.finish();
        assert!(stimulus.view().is_finished());
    }
}
