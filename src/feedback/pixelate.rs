// src/feedback/pixelate.rs

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::error::{PipelineError, Result};

/// Side length of the downscaled image for a smoothed confidence.
///
/// `ceil(side * smoothed)` clamped to `[1, side]`; a non-finite confidence shows full detail.
pub fn displayed_scale(side: u32, smoothed: f64) -> u32 {
    if !smoothed.is_finite() {
        return side;
    }
    let scaled = (side as f64 * smoothed).ceil();
    (scaled.max(1.0) as u32).min(side).max(1)
}

/// Renders the stimulus at a resolution that tracks confidence.
#[derive(Debug, Clone)]
pub struct Pixelator {
    side: u32,
    source: RgbaImage,
}

impl Pixelator {
    pub fn new(source: RgbaImage, side: u32) -> Result<Self> {
        if side == 0 {
            return Err(PipelineError::invalid("pixelator", "side must be positive"));
        }
        let source = if source.dimensions() == (side, side) {
            source
        } else {
            imageops::resize(&source, side, side, FilterType::CatmullRom)
        };
        Ok(Self { side, source })
    }

    pub fn from_path(path: &Path, side: u32) -> Result<Self> {
        let image = image::open(path)?.to_rgba8();
        Self::new(image, side)
    }

    pub fn hexagon(side: u32) -> Result<Self> {
        Self::new(hexagon_placeholder(side), side)
    }

    pub fn side(&self) -> u32 {
        self.side
    }

    /// Bilinear downscale to `displayed_scale`, then nearest-neighbour back up to `side`.
    pub fn frame(&self, smoothed: f64) -> RgbaImage {
        let small = displayed_scale(self.side, smoothed);
        if small == self.side {
            return self.source.clone();
        }
        let reduced = imageops::resize(&self.source, small, small, FilterType::Triangle);
        imageops::resize(&reduced, self.side, self.side, FilterType::Nearest)
    }
}

/// Pointy-top hexagon with a warm radial gradient on black.
pub fn hexagon_placeholder(side: u32) -> RgbaImage {
    let centre = side as f64 / 2.0;
    let radius = side as f64 * 0.45;
    let half_width = radius * 3f64.sqrt() / 2.0;

    RgbaImage::from_fn(side, side, |x, y| {
        let dx = (x as f64 + 0.5 - centre).abs();
        let dy = (y as f64 + 0.5 - centre).abs();
        let inside = dx <= half_width && dy <= radius - dx / 3f64.sqrt();
        if !inside {
            return Rgba([0, 0, 0, 255]);
        }
        let t = ((dx * dx + dy * dy).sqrt() / radius).min(1.0);
        let ring = if ((t * 8.0) as u32) % 2 == 0 { 1.0 } else { 0.8 };
        Rgba([
            (255.0 * ring) as u8,
            ((200.0 - 140.0 * t) * ring) as u8,
            ((80.0 - 70.0 * t) * ring) as u8,
            255,
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_is_clamped() {
        assert_eq!(displayed_scale(600, 1.0), 600);
        assert_eq!(displayed_scale(600, 0.5), 300);
        assert_eq!(displayed_scale(600, 0.0), 1);
        assert_eq!(displayed_scale(600, 1.4), 600);
        assert_eq!(displayed_scale(600, -0.3), 1);
        assert_eq!(displayed_scale(600, 0.001), 1);
        assert_eq!(displayed_scale(600, 0.0034), 3);
    }

    #[test]
    fn frames_keep_the_full_size() {
        let pixelator = Pixelator::hexagon(64).unwrap();
        for smoothed in [0.0, 0.1, 0.5, 1.0] {
            assert_eq!(pixelator.frame(smoothed).dimensions(), (64, 64));
        }
    }

    #[test]
    fn low_confidence_collapses_to_blocks() {
        let pixelator = Pixelator::hexagon(64).unwrap();
        let frame = pixelator.frame(0.0);
        let first = *frame.get_pixel(0, 0);
        assert!(frame.pixels().all(|p| *p == first));

        let sharp = pixelator.frame(1.0);
        let distinct: std::collections::HashSet<_> = sharp.pixels().map(|p| p.0).collect();
        assert!(distinct.len() > 4);
    }

    #[test]
    fn source_is_resized_to_side() {
        let pixelator = Pixelator::new(RgbaImage::new(10, 20), 32).unwrap();
        assert_eq!(pixelator.frame(1.0).dimensions(), (32, 32));
        assert!(Pixelator::new(RgbaImage::new(4, 4), 0).is_err());
    }
}
