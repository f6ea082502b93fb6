// ============================================================
// Layer 5 — Learning-Rate Schedule
// ============================================================
// Linear warmup from 0 to the base rate, then decay to 0 at the
// end of the step budget:
//
//   lr
//    │     ╱‾‾‾‾‾‾‾‾‾‾‾‾‾╲___            cosine
//    │    ╱                  ‾‾╲__
//    │   ╱                        ‾╲
//    │  ╱                            ╲
//    └──┴──────────────────────────────▶ step
//       warmup                     total
//
//   warmup:  lr(t) = base · t / warmup
//   linear:  lr(t) = base · (total - t) / (total - warmup)
//   cosine:  lr(t) = base · ½ (1 + cos(π · progress))

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayShape {
    Linear,
    #[default]
    Cosine,
}

impl fmt::Display for DecayShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecayShape::Linear => "linear",
            DecayShape::Cosine => "cosine",
        })
    }
}

impl FromStr for DecayShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(DecayShape::Linear),
            "cosine" => Ok(DecayShape::Cosine),
            other    => Err(format!("unknown decay shape '{other}' (expected linear or cosine)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrSchedule {
    base_lr:      f64,
    warmup_steps: usize,
    total_steps:  usize,
    decay:        DecayShape,
}

impl LrSchedule {
    pub fn new(base_lr: f64, warmup_steps: usize, total_steps: usize, decay: DecayShape) -> Self {
        Self { base_lr, warmup_steps, total_steps, decay }
    }

    /// Learning rate for the update made at `step` (0-based).
    pub fn lr_at(&self, step: usize) -> f64 {
        if step < self.warmup_steps {
            return self.base_lr * step as f64 / self.warmup_steps as f64;
        }
        if step >= self.total_steps {
            return 0.0;
        }

        let span     = (self.total_steps - self.warmup_steps) as f64;
        let progress = (step - self.warmup_steps) as f64 / span;
        match self.decay {
            DecayShape::Linear => self.base_lr * (1.0 - progress),
            DecayShape::Cosine => self.base_lr * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos()),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}

/// Optimizer updates in a fold: `epochs · ceil(train_len / batch_size)`, capped by `max_steps`.
pub fn total_steps(train_len: usize, batch_size: usize, epochs: usize, max_steps: Option<usize>) -> usize {
    let per_epoch = train_len.div_ceil(batch_size.max(1));
    let budget    = per_epoch * epochs;
    max_steps.map_or(budget, |m| m.min(budget))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_warmup_is_linear_from_zero() {
        let s = LrSchedule::new(2e-5, 4, 20, DecayShape::Cosine);
        assert_eq!(s.lr_at(0), 0.0);
        assert!(close(s.lr_at(2), 1e-5));
        assert!(close(s.lr_at(4), 2e-5));
    }

    #[test]
    fn test_linear_decay() {
        let s = LrSchedule::new(1.0, 0, 10, DecayShape::Linear);
        assert!(close(s.lr_at(0), 1.0));
        assert!(close(s.lr_at(5), 0.5));
        assert_eq!(s.lr_at(10), 0.0);
        assert_eq!(s.lr_at(50), 0.0);
    }

    #[test]
    fn test_cosine_decay() {
        let s = LrSchedule::new(1.0, 2, 12, DecayShape::Cosine);
        assert!(close(s.lr_at(2), 1.0));
        assert!(close(s.lr_at(7), 0.5));
        assert!(s.lr_at(11) < 0.05);
        assert_eq!(s.lr_at(12), 0.0);
    }

    #[test]
    fn test_warmup_longer_than_budget() {
        let s = LrSchedule::new(1.0, 300, 10, DecayShape::Linear);
        assert!(close(s.lr_at(3), 0.01));
    }

    #[test]
    fn test_total_steps() {
        assert_eq!(total_steps(33, 16, 4, None), 12);
        assert_eq!(total_steps(33, 16, 4, Some(5)), 5);
        assert_eq!(total_steps(0, 16, 4, None), 0);
    }

    #[test]
    fn test_parse_shape() {
        assert_eq!("linear".parse::<DecayShape>().unwrap(), DecayShape::Linear);
        assert!("step".parse::<DecayShape>().is_err());
    }
}
