// src/processing/segmenter.rs

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const STAGE: &str = "segmenter";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SegmenterConfig {
    /// Length of one classification window, in seconds.
    pub window_seconds: f64,
    /// Fraction of a window shared with its successor, in [0, 1).
    pub overlap_fraction: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            window_seconds: 1.0,
            overlap_fraction: 0.93,
        }
    }
}

impl SegmenterConfig {
    /// Resolves the configured durations into `(window_size, overlap)` sample counts.
    pub fn resolve(&self, sampling_rate: u32) -> Result<(usize, usize)> {
        if !(0.0..1.0).contains(&self.overlap_fraction) {
            return Err(PipelineError::invalid(
                STAGE,
                format!("overlap_fraction {} outside [0, 1)", self.overlap_fraction),
            ));
        }
        let window_size = (self.window_seconds * sampling_rate as f64).round() as usize;
        let overlap = (window_size as f64 * self.overlap_fraction).floor() as usize;
        validate(window_size, overlap)?;
        Ok((window_size, overlap))
    }
}

/// A fixed-length slice of one trial. Rows are channels.
#[derive(Debug, Clone)]
pub struct Window<L> {
    pub data: Array2<f64>,
    pub label: L,
    pub trial: usize,
    pub offset: usize,
}

fn validate(window_size: usize, overlap: usize) -> Result<()> {
    if window_size == 0 {
        return Err(PipelineError::invalid(STAGE, "window size must be positive"));
    }
    if overlap >= window_size {
        return Err(PipelineError::invalid(
            STAGE,
            format!("overlap {} >= window size {}", overlap, window_size),
        ));
    }
    Ok(())
}

/// Number of full windows that fit in `total_samples`.
pub fn window_count(total_samples: usize, window_size: usize, overlap: usize) -> Result<usize> {
    validate(window_size, overlap)?;
    if total_samples < window_size {
        return Ok(0);
    }
    let step = window_size - overlap;
    Ok((total_samples - window_size) / step + 1)
}

/// Start offsets of every full window, in time order.
pub fn window_offsets(total_samples: usize, window_size: usize, overlap: usize) -> Result<Vec<usize>> {
    let count = window_count(total_samples, window_size, overlap)?;
    let step = window_size - overlap;
    Ok((0..count).map(|i| i * step).collect())
}

/// Slices `series` (`[channels, samples]`) into overlapping windows.
///
/// A trailing partial window is dropped, never padded.
pub fn segment(series: ArrayView2<f64>, window_size: usize, overlap: usize) -> Result<Vec<Array2<f64>>> {
    let offsets = window_offsets(series.ncols(), window_size, overlap)?;
    Ok(offsets
        .into_iter()
        .map(|start| series.slice(s![.., start..start + window_size]).to_owned())
        .collect())
}

/// Segments a trial and tags every window with its label and origin.
pub fn segment_trial<L: Clone>(
    series: ArrayView2<f64>,
    label: L,
    trial: usize,
    window_size: usize,
    overlap: usize,
) -> Result<Vec<Window<L>>> {
    let offsets = window_offsets(series.ncols(), window_size, overlap)?;
    Ok(offsets
        .into_iter()
        .map(|offset| Window {
            data: series.slice(s![.., offset..offset + window_size]).to_owned(),
            label: label.clone(),
            trial,
            offset,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(channels: usize, samples: usize) -> Array2<f64> {
        Array2::from_shape_fn((channels, samples), |(c, i)| (c * 10_000 + i) as f64)
    }

    #[test]
    fn thousand_samples_give_four_windows() {
        let offsets = window_offsets(1000, 250, 50).unwrap();
        assert_eq!(offsets, vec![0, 200, 400, 600]);
        assert_eq!(window_count(1000, 250, 50).unwrap(), 4);
    }

    #[test]
    fn windows_follow_time_order() {
        let series = ramp(2, 1000);
        let windows = segment(series.view(), 250, 50).unwrap();
        assert_eq!(windows.len(), 4);
        for (window, start) in windows.iter().zip([0usize, 200, 400, 600]) {
            assert_eq!(window.dim(), (2, 250));
            assert_eq!(window[[0, 0]], start as f64);
            assert_eq!(window[[1, 249]], (10_000 + start + 249) as f64);
        }
    }

    #[test]
    fn short_series_gives_no_windows() {
        let series = ramp(3, 100);
        assert!(segment(series.view(), 250, 0).unwrap().is_empty());
    }

    #[test]
    fn overlap_at_window_size_is_rejected() {
        let series = ramp(1, 500);
        let err = segment(series.view(), 250, 250).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn trailing_partial_window_is_dropped() {
        let series = ramp(1, 520);
        let windows = segment(series.view(), 100, 0).unwrap();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[4][[0, 99]], 499.0);
    }

    #[test]
    fn config_resolves_default_overlap() {
        let (window, overlap) = SegmenterConfig::default().resolve(250).unwrap();
        assert_eq!(window, 250);
        assert_eq!(overlap, 232);
    }

    #[test]
    fn labelled_windows_keep_origin() {
        let series = ramp(1, 600);
        let windows = segment_trial(series.view(), "button", 2, 200, 100).unwrap();
        assert_eq!(windows.len(), 5);
        assert!(windows.iter().all(|w| w.trial == 2 && w.label == "button"));
        assert_eq!(windows[3].offset, 300);
    }
}
