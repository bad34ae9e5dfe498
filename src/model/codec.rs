// src/model/codec.rs

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const STAGE: &str = "label_codec";

/// Class names for the two trial kinds.
pub const BASELINE: &str = "baseline";
pub const INTENT: &str = "button";

/// Stable mapping between class names, integer indices and one-hot rows.
///
/// The order is the sorted set of labels seen at fit time. It never changes
/// afterwards and travels inside the model bundle.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct LabelCodec {
    classes: Vec<String>,
}

impl LabelCodec {
    pub fn fit<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut classes: Vec<String> = labels.into_iter().map(|l| l.as_ref().to_string()).collect();
        classes.sort();
        classes.dedup();
        if classes.is_empty() {
            return Err(PipelineError::invalid(STAGE, "no labels to fit"));
        }
        Ok(Self { classes })
    }

    fn ensure_fitted(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(PipelineError::NotFitted { stage: STAGE });
        }
        Ok(())
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.ensure_fitted()?;
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| PipelineError::UnknownLabel(label.to_string()))
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.ensure_fitted()?;
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| PipelineError::UnknownLabel(format!("class index {}", index)))
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// `[labels.len(), classes]` one-hot matrix.
    pub fn encode_one_hot<S: AsRef<str>>(&self, labels: &[S]) -> Result<Array2<f64>> {
        let indices = self.encode_all(labels)?;
        Ok(one_hot(&indices, self.len()))
    }
}

pub fn one_hot(indices: &[usize], classes: usize) -> Array2<f64> {
    let mut out = Array2::zeros((indices.len(), classes));
    for (row, &class) in indices.iter().enumerate() {
        out[[row, class]] = 1.0;
    }
    out
}
