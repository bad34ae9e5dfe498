// src/model/metrics.rs

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassScores {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassScores>,
    pub accuracy: f64,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
    pub confusion: Vec<Vec<usize>>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Precision, recall and F1 per class. Undefined ratios are reported as 0.
pub fn classification_report(y_true: &[usize], y_pred: &[usize], labels: &[String]) -> ClassificationReport {
    let k = labels.len();
    let mut confusion = vec![vec![0usize; k]; k];
    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < k && p < k {
            confusion[t][p] += 1;
        }
    }

    let per_class: Vec<ClassScores> = (0..k)
        .map(|c| {
            let tp = confusion[c][c];
            let predicted: usize = (0..k).map(|r| confusion[r][c]).sum();
            let support: usize = confusion[c].iter().sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassScores {
                label: labels[c].clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect();

    let total: usize = per_class.iter().map(|s| s.support).sum();
    let correct: usize = (0..k).map(|c| confusion[c][c]).sum();

    let average = |label: &str, weight: &dyn Fn(&ClassScores) -> f64| {
        let norm: f64 = per_class.iter().map(|s| weight(s)).sum();
        let mean = |f: fn(&ClassScores) -> f64| {
            if norm == 0.0 {
                0.0
            } else {
                per_class.iter().map(|s| weight(s) * f(s)).sum::<f64>() / norm
            }
        };
        ClassScores {
            label: label.to_string(),
            precision: mean(|s| s.precision),
            recall: mean(|s| s.recall),
            f1: mean(|s| s.f1),
            support: total,
        }
    };

    let macro_avg = average("macro avg", &|_| 1.0);
    let weighted_avg = average("weighted avg", &|s| s.support as f64);

    ClassificationReport {
        accuracy: ratio(correct, total),
        per_class,
        macro_avg,
        weighted_avg,
        confusion,
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|s| s.label.len())
            .chain([self.weighted_avg.label.len()])
            .max()
            .unwrap_or(12);
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        )?;
        writeln!(f)?;
        let row = |f: &mut fmt::Formatter<'_>, s: &ClassScores| {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                s.label,
                s.precision,
                s.recall,
                s.f1,
                s.support,
                width = width
            )
        };
        for s in &self.per_class {
            row(f, s)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support,
            width = width
        )?;
        row(f, &self.macro_avg)?;
        row(f, &self.weighted_avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["baseline".to_string(), "button".to_string()]
    }

    #[test]
    fn perfect_predictions() {
        let y = [0, 1, 1, 0];
        let report = classification_report(&y, &y, &labels());
        assert_eq!(report.accuracy, 1.0);
        for s in &report.per_class {
            assert_eq!((s.precision, s.recall, s.f1), (1.0, 1.0, 1.0));
        }
        assert_eq!(report.confusion, vec![vec![2, 0], vec![0, 2]]);
    }

    #[test]
    fn mixed_predictions() {
        // baseline: tp 2, fn 1; button: tp 1, fp 1
        let y_true = [0, 0, 0, 1];
        let y_pred = [0, 0, 1, 1];
        let report = classification_report(&y_true, &y_pred, &labels());

        let baseline = &report.per_class[0];
        assert_eq!(baseline.precision, 1.0);
        assert!((baseline.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(baseline.support, 3);

        let button = &report.per_class[1];
        assert_eq!(button.precision, 0.5);
        assert_eq!(button.recall, 1.0);

        assert_eq!(report.accuracy, 0.75);
        assert!((report.macro_avg.recall - (2.0 / 3.0 + 1.0) / 2.0).abs() < 1e-12);
        assert!((report.weighted_avg.recall - 0.75).abs() < 1e-12);
        assert_eq!(report.weighted_avg.support, 4);
    }

    #[test]
    fn missing_class_scores_zero() {
        let report = classification_report(&[0, 0], &[0, 0], &labels());
        assert_eq!(report.per_class[1].precision, 0.0);
        assert_eq!(report.per_class[1].f1, 0.0);
        let text = report.to_string();
        assert!(text.contains("weighted avg"));
        assert!(text.contains("precision"));
    }
}
