// ============================================================
// Layer 5 — Evaluation Metrics
// ============================================================
// Classification report over predicted vs gold label ids.
//
//   per class c:  P = TP / (TP + FP)    R = TP / (TP + FN)
//                 F1 = 2PR / (P + R)
//   micro:        pool TP/FP/FN over every class, then P, R, F1
//   macro F1:     unweighted mean of the per-class F1
//
// Every class in [0, num_classes) is counted, including
// no_relation, and any ratio with a zero denominator is 0.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
    pub support:   usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy:        f64,
    pub per_class:       Vec<ClassMetrics>,
    pub micro_precision: f64,
    pub micro_recall:    f64,
    pub micro_f1:        f64,
    pub macro_f1:        f64,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(p: f64, r: f64) -> f64 {
    if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
}

impl ClassificationReport {
    /// Ids at or above `num_classes` count as errors but belong to no class.
    pub fn compute(predictions: &[usize], labels: &[usize], num_classes: usize) -> Self {
        let mut tp = vec![0usize; num_classes];
        let mut fp = vec![0usize; num_classes];
        let mut fn_ = vec![0usize; num_classes];
        let mut correct = 0usize;

        for (&p, &g) in predictions.iter().zip(labels) {
            if p == g {
                correct += 1;
                if let Some(t) = tp.get_mut(g) {
                    *t += 1;
                }
            } else {
                if let Some(f) = fp.get_mut(p) {
                    *f += 1;
                }
                if let Some(f) = fn_.get_mut(g) {
                    *f += 1;
                }
            }
        }

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|c| {
                let precision = ratio(tp[c], tp[c] + fp[c]);
                let recall    = ratio(tp[c], tp[c] + fn_[c]);
                ClassMetrics { precision, recall, f1: f1(precision, recall), support: tp[c] + fn_[c] }
            })
            .collect();

        let (tp_sum, fp_sum, fn_sum) = (tp.iter().sum::<usize>(), fp.iter().sum::<usize>(), fn_.iter().sum::<usize>());
        let micro_precision = ratio(tp_sum, tp_sum + fp_sum);
        let micro_recall    = ratio(tp_sum, tp_sum + fn_sum);
        let macro_f1 = if num_classes == 0 {
            0.0
        } else {
            per_class.iter().map(|m| m.f1).sum::<f64>() / num_classes as f64
        };

        Self {
            accuracy: ratio(correct, predictions.len().min(labels.len())),
            per_class,
            micro_precision,
            micro_recall,
            micro_f1: f1(micro_precision, micro_recall),
            macro_f1,
        }
    }

    pub fn metric(&self, which: CheckpointMetric) -> f64 {
        match which {
            CheckpointMetric::MicroF1  => self.micro_f1,
            CheckpointMetric::MacroF1  => self.macro_f1,
            CheckpointMetric::Accuracy => self.accuracy,
        }
    }
}

/// The metric that decides which evaluation is a fold's best. Higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMetric {
    #[default]
    MicroF1,
    MacroF1,
    Accuracy,
}

impl fmt::Display for CheckpointMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckpointMetric::MicroF1  => "micro_f1",
            CheckpointMetric::MacroF1  => "macro_f1",
            CheckpointMetric::Accuracy => "accuracy",
        })
    }
}

impl FromStr for CheckpointMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "micro_f1" => Ok(CheckpointMetric::MicroF1),
            "macro_f1" => Ok(CheckpointMetric::MacroF1),
            "accuracy" => Ok(CheckpointMetric::Accuracy),
            other      => Err(format!("unknown checkpoint metric '{other}'")),
        }
    }
}
