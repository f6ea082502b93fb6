// ============================================================
// Layer 5 — Classification Losses
// ============================================================
// Three interchangeable objectives over [batch, 30] logits:
//
//   cross_entropy            plain CE
//   label_smoothing[:ε]      CE against (1-ε)·one_hot + ε/C
//   class_balanced_margin    LDAM (Cao et al., 2019)
//
// LDAM subtracts a per-class margin from the gold logit before
// CE, larger for rarer classes:
//
//   m_j = C / n_j^(1/4)        with C chosen so max_j m_j = max_margin
//   loss = CE( s · (z - m_y · one_hot(y)), y )
//
// The margins come from the label counts of the training split
// the loss is built for, so every fold gets its own.
//
// Reference: Cao et al. (2019) Learning Imbalanced Datasets with
//            Label-Distribution-Aware Margin Loss

use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::domain::error::ReError;
use crate::domain::label::LabelFrequencyTable;

pub const DEFAULT_SMOOTHING:  f64 = 0.1;
pub const DEFAULT_MAX_MARGIN: f64 = 0.5;
pub const DEFAULT_SCALE:      f64 = 30.0;

/// Which objective a fold trains with.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LossKind {
    #[default]
    CrossEntropy,
    LabelSmoothing { factor: f64 },
    ClassBalancedMargin { max_margin: f64, scale: f64 },
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossKind::CrossEntropy                => write!(f, "cross_entropy"),
            LossKind::LabelSmoothing { factor }   => write!(f, "label_smoothing:{factor}"),
            LossKind::ClassBalancedMargin { .. }  => write!(f, "class_balanced_margin"),
        }
    }
}

impl FromStr for LossKind {
    type Err = ReError;

    /// `cross_entropy` | `label_smoothing[:ε]` | `class_balanced_margin` (alias `ldam`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ReError::UnknownLoss(s.to_string());
        let (name, arg) = match s.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None         => (s, None),
        };

        match (name, arg) {
            ("cross_entropy" | "ce", None) => Ok(LossKind::CrossEntropy),
            ("label_smoothing", None) => Ok(LossKind::LabelSmoothing { factor: DEFAULT_SMOOTHING }),
            ("label_smoothing", Some(a)) => {
                let factor: f64 = a.parse().map_err(|_| unknown())?;
                let kind = LossKind::LabelSmoothing { factor };
                kind.check()?;
                Ok(kind)
            }
            ("class_balanced_margin" | "ldam", None) => Ok(LossKind::ClassBalancedMargin {
                max_margin: DEFAULT_MAX_MARGIN,
                scale:      DEFAULT_SCALE,
            }),
            _ => Err(unknown()),
        }
    }
}

impl LossKind {
    /// Parameter ranges `build` relies on. Config files bypass `FromStr`,
    /// so the trainer checks again before any fold starts.
    pub fn check(&self) -> Result<(), ReError> {
        let invalid = |reason: String| ReError::InvalidLoss { loss: self.name().to_string(), reason };
        match *self {
            LossKind::CrossEntropy => Ok(()),
            LossKind::LabelSmoothing { factor } => {
                if (0.0..1.0).contains(&factor) {
                    Ok(())
                } else {
                    Err(invalid(format!("factor must lie in [0, 1), got {factor}")))
                }
            }
            LossKind::ClassBalancedMargin { max_margin, scale } => {
                if !(max_margin.is_finite() && max_margin > 0.0) {
                    return Err(invalid(format!("max_margin must be finite and positive, got {max_margin}")));
                }
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(invalid(format!("scale must be finite and positive, got {scale}")));
                }
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            LossKind::CrossEntropy              => "cross_entropy",
            LossKind::LabelSmoothing { .. }     => "label_smoothing",
            LossKind::ClassBalancedMargin { .. } => "class_balanced_margin",
        }
    }

    /// Build the loss for one training split.
    pub fn build<B: Backend>(&self, frequencies: &LabelFrequencyTable, device: &B::Device) -> RelationLoss<B> {
        match *self {
            LossKind::CrossEntropy => RelationLoss::Plain(CrossEntropyLossConfig::new().init(device)),
            LossKind::LabelSmoothing { factor } => RelationLoss::Plain(
                CrossEntropyLossConfig::new()
                    .with_smoothing(Some(factor as f32))
                    .init(device),
            ),
            LossKind::ClassBalancedMargin { max_margin, scale } => {
                let margins = ldam_margins(frequencies.counts(), max_margin);
                tracing::debug!("LDAM margins: {:?}", margins);
                RelationLoss::Margin {
                    ce:      CrossEntropyLossConfig::new().init(device),
                    margins: Tensor::<B, 1>::from_floats(margins.as_slice(), device),
                    scale,
                }
            }
        }
    }
}

/// Per-class LDAM margins. Zero counts are treated as one occurrence.
pub fn ldam_margins(counts: &[usize], max_margin: f64) -> Vec<f32> {
    let raw: Vec<f64> = counts
        .iter()
        .map(|&n| 1.0 / (n.max(1) as f64).powf(0.25))
        .collect();
    let peak = raw.iter().copied().fold(0.0f64, f64::max);
    if peak == 0.0 {
        return vec![0.0; counts.len()];
    }
    raw.iter().map(|m| (m * max_margin / peak) as f32).collect()
}

pub enum RelationLoss<B: Backend> {
    Plain(CrossEntropyLoss<B>),
    Margin {
        ce:      CrossEntropyLoss<B>,
        margins: Tensor<B, 1>,
        scale:   f64,
    },
}

impl<B: Backend> RelationLoss<B> {
    /// logits: [batch, classes], targets: [batch] → scalar loss [1]
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        match self {
            RelationLoss::Plain(ce) => ce.forward(logits, targets),
            RelationLoss::Margin { ce, margins, scale } => {
                let [batch_size, num_classes] = logits.dims();
                let device = logits.device();

                let classes = Tensor::<B, 1, Int>::arange(0..num_classes as i64, &device)
                    .reshape([1, num_classes])
                    .expand([batch_size, num_classes]);
                let one_hot = targets
                    .clone()
                    .reshape([batch_size, 1])
                    .expand([batch_size, num_classes])
                    .equal(classes)
                    .float();
                let margin = margins
                    .clone()
                    .reshape([1, num_classes])
                    .expand([batch_size, num_classes]);

                let adjusted = (logits - one_hot * margin) * *scale;
                ce.forward(adjusted, targets)
            }
        }
    }
}
