// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn model and training code lives here.
//
//   model.rs      — transformer encoder with a [CLS]-pooled
//                   30-way relation head
//
//   loss.rs       — cross-entropy, label smoothing and the
//                   class-balanced margin (LDAM) loss
//
//   schedule.rs   — warmup + linear/cosine learning-rate decay
//
//   evaluation.rs — accuracy, per-class / micro / macro scores
//
//   trainer.rs    — per-fold train/evaluate/checkpoint loop
//                   and the sequential k-fold driver
//
//   ensemble.rs   — loads the K fold artifacts and hard-votes
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Devlin et al. (2019) BERT

/// Transformer relation classifier
pub mod model;

/// Pluggable classification losses
pub mod loss;

/// Learning-rate warmup and decay
pub mod schedule;

/// Classification report and checkpoint metric
pub mod evaluation;

/// Stratified ensemble training loop
pub mod trainer;

/// Hard-voting over fold artifacts
pub mod ensemble;
