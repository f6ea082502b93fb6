// ============================================================
// Layer 5 — Stratified Ensemble Trainer
// ============================================================
// Trains one classifier per fold, strictly one fold at a time:
//
//   for fold f in 1..=K:
//     INIT        fresh model, fresh loss built from the
//                 label counts of this fold's training split
//     TRAINING    AdamW steps, lr from warmup + decay schedule
//     EVALUATING  every eval_interval_steps on the fold's
//                 validation split
//     CHECKPOINTED  metric beat every earlier evaluation:
//                   weights written to <run_name>_<f>/
//     STOPPED_EARLY patience evaluations without improvement
//     DONE        final weights written if no evaluation ever
//                 improved
//
// Key Burn insight:
//   - Training runs on B (AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend, so
//     the validation batcher must use B::InnerBackend too
//
// A non-finite loss stops the run with TrainingDivergence
// before the optimizer applies that step. The CancelFlag is
// checked before every step; a cancelled fold keeps whatever
// checkpoint it already wrote and nothing else.
//
// Reference: Burn Book §5, Loshchilov & Hutter (2019) AdamW

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{ReBatch, ReBatcher},
    dataset::ReDataset,
    pairing::MAX_PAIR_TOKENS,
    splitter::{full_split, stratified_holdout, stratified_k_fold, FoldSplit},
};
use crate::domain::{error::ReError, label::NUM_LABELS};
use crate::infra::{
    checkpoint::{fold_dir_name, CheckpointManager},
    tracking::Tracker,
};
use crate::ml::{
    evaluation::ClassificationReport,
    loss::LossKind,
    model::{ids_from_tensor, ReClassifier, ReClassifierConfig},
    schedule::{total_steps, LrSchedule},
};

// ─── Cancellation ─────────────────────────────────────────────────────────────
/// Shared stop request, checked at every step boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Fold Planning ────────────────────────────────────────────────────────────
/// Everything one fold needs, fixed before the fold starts.
#[derive(Debug, Clone)]
pub struct FoldPlan {
    /// 1-based fold index
    pub fold:  usize,
    pub train: ReDataset,
    pub valid: ReDataset,
    /// Built against `train.label_frequencies()` when the fold starts.
    pub loss:  LossKind,
}

impl FoldPlan {
    pub fn new(fold: usize, split: &FoldSplit, dataset: &ReDataset, loss: LossKind) -> Result<Self, ReError> {
        Ok(Self {
            fold,
            train: dataset.subset(&split.train)?,
            valid: dataset.subset(&split.valid)?,
            loss,
        })
    }
}

/// Train/validation index splits for the configured training mode.
pub fn fold_splits(cfg: &TrainConfig, labels: &[usize]) -> Vec<FoldSplit> {
    if cfg.num_folds >= 2 {
        return stratified_k_fold(labels, cfg.num_folds, cfg.seed);
    }
    match cfg.valid_fraction {
        Some(fraction) => vec![stratified_holdout(labels, fraction, cfg.seed)],
        None => {
            tracing::warn!("Single run without holdout: evaluating on the training data");
            vec![full_split(labels.len())]
        }
    }
}

pub fn model_config(cfg: &TrainConfig, vocab_rows: usize) -> ReClassifierConfig {
    ReClassifierConfig::new(
        vocab_rows, MAX_PAIR_TOKENS, cfg.d_model,
        cfg.num_heads, cfg.num_layers, cfg.d_ff,
    )
    .with_dropout(cfg.dropout)
}

// ─── Fold State ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldState {
    Init,
    Training,
    Evaluating,
    Checkpointed,
    StoppedEarly,
    Done,
}

struct FoldProgress {
    fold:  usize,
    state: FoldState,
}

impl FoldProgress {
    fn new(fold: usize) -> Self {
        tracing::debug!("fold {}: {:?}", fold, FoldState::Init);
        Self { fold, state: FoldState::Init }
    }

    fn enter(&mut self, next: FoldState) {
        tracing::debug!("fold {}: {:?} → {:?}", self.fold, self.state, next);
        self.state = next;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStatus {
    Completed,
    StoppedEarly,
    Cancelled,
}

/// Outcome of one fold.
#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    pub fold:         usize,
    pub artifact_dir: PathBuf,
    /// Best checkpoint metric seen, if any evaluation ran
    pub best_metric:  Option<f64>,
    pub best_step:    Option<usize>,
    pub steps:        usize,
    pub status:       FoldStatus,
    /// Whether the artifact directory holds a model
    pub saved:        bool,
}

fn ensure_finite(fold: usize, step: usize, loss: f64) -> Result<(), ReError> {
    if loss.is_finite() {
        Ok(())
    } else {
        Err(ReError::TrainingDivergence { fold, step, loss })
    }
}

// ─── Ensemble ─────────────────────────────────────────────────────────────────
/// Train every fold in order. Stops after the first cancelled fold.
pub fn run_ensemble<B: AutodiffBackend>(
    cfg:        &TrainConfig,
    dataset:    &ReDataset,
    vocab_rows: usize,
    tracker:    &mut Tracker,
    cancel:     &CancelFlag,
    device:     &B::Device,
) -> Result<Vec<FoldReport>> {
    let splits    = fold_splits(cfg, &dataset.labels());
    let model_cfg = model_config(cfg, vocab_rows);
    let mut reports = Vec::with_capacity(splits.len());

    for (i, split) in splits.iter().enumerate() {
        let plan = FoldPlan::new(i + 1, split, dataset, cfg.loss)?;
        tracing::info!(
            "Fold {}/{}: {} training, {} validation examples, loss={}",
            plan.fold, splits.len(), plan.train.size(), plan.valid.size(), plan.loss,
        );

        let report = train_fold::<B>(cfg, &plan, &model_cfg, tracker, cancel, device)
            .with_context(|| format!("Fold {} failed", plan.fold))?;
        let cancelled = report.status == FoldStatus::Cancelled;
        reports.push(report);
        if cancelled {
            tracing::warn!("Training cancelled during fold {}; remaining folds skipped", i + 1);
            break;
        }
    }
    Ok(reports)
}

// ─── Single Fold ──────────────────────────────────────────────────────────────
pub fn train_fold<B: AutodiffBackend>(
    cfg:       &TrainConfig,
    plan:      &FoldPlan,
    model_cfg: &ReClassifierConfig,
    tracker:   &mut Tracker,
    cancel:    &CancelFlag,
    device:    &B::Device,
) -> Result<FoldReport> {
    let mut progress = FoldProgress::new(plan.fold);
    let run_name     = fold_dir_name(&cfg.run_name, plan.fold);
    let artifact     = CheckpointManager::for_fold(Path::new(&cfg.output_dir), &cfg.run_name, plan.fold);

    B::seed(cfg.seed);
    let mut model: ReClassifier<B> = model_cfg.init(device);
    let loss_fn = plan.loss.build::<B>(plan.train.label_frequencies(), device);
    let mut optim = AdamWConfig::new()
        .with_weight_decay(cfg.weight_decay as f32)
        .init();

    let budget   = total_steps(plan.train.size(), cfg.batch_size, cfg.epochs, cfg.max_steps);
    let schedule = LrSchedule::new(cfg.learning_rate, cfg.warmup_steps, budget, cfg.decay);

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_loader = DataLoaderBuilder::new(ReBatcher::<B>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(plan.train.clone());

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let valid_loader = DataLoaderBuilder::new(ReBatcher::<B::InnerBackend>::new(device.clone()))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(plan.valid.clone());

    let mut step          = 0usize;
    let mut best: Option<(f64, usize)> = None;
    let mut stale_evals   = 0usize;
    let mut window_loss   = 0.0f64;
    let mut window_steps  = 0usize;
    let mut status        = FoldStatus::Completed;
    let mut saved         = false;

    progress.enter(FoldState::Training);
    'epochs: for epoch in 1..=cfg.epochs {
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for batch in train_loader.iter() {
            if cancel.is_cancelled() {
                status = FoldStatus::Cancelled;
                break 'epochs;
            }
            if step >= budget {
                break 'epochs;
            }

            let logits = model.forward(batch.input_ids, batch.attention_mask, batch.token_type_ids);
            let loss   = loss_fn.forward(logits, batch.labels);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            ensure_finite(plan.fold, step + 1, loss_val)?;

            let lr    = schedule.lr_at(step);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model     = optim.step(lr, model, grads);
            step     += 1;

            loss_sum += loss_val;
            batches  += 1;
            window_loss  += loss_val;
            window_steps += 1;
            if step % cfg.logging_steps.max(1) == 0 {
                tracker.log(&run_name, step, "train/loss", window_loss / window_steps as f64);
                tracker.log(&run_name, step, "train/lr", lr);
                window_loss  = 0.0;
                window_steps = 0;
            }

            if step % cfg.eval_interval_steps.max(1) == 0 {
                progress.enter(FoldState::Evaluating);
                let report = evaluate(&model.valid(), &valid_loader)?;
                let score  = report.metric(cfg.checkpoint_metric);
                tracker.log(&run_name, step, "eval/accuracy", report.accuracy);
                tracker.log(&run_name, step, "eval/micro_f1", report.micro_f1);
                tracker.log(&run_name, step, "eval/macro_f1", report.macro_f1);
                tracing::info!(
                    "fold {} step {:>5} | acc={:.4} micro_f1={:.4} macro_f1={:.4}",
                    plan.fold, step, report.accuracy, report.micro_f1, report.macro_f1,
                );

                if best.map_or(true, |(b, _)| score > b) {
                    best        = Some((score, step));
                    stale_evals = 0;
                    persist(&artifact, cfg, model_cfg, &model)?;
                    saved = true;
                    progress.enter(FoldState::Checkpointed);
                    tracing::info!("fold {}: new best {}={:.4}", plan.fold, cfg.checkpoint_metric, score);
                } else {
                    stale_evals += 1;
                    if cfg.early_stopping_patience.is_some_and(|p| stale_evals >= p) {
                        progress.enter(FoldState::StoppedEarly);
                        tracing::info!("fold {}: no improvement in {} evaluations, stopping", plan.fold, stale_evals);
                        status = FoldStatus::StoppedEarly;
                        break 'epochs;
                    }
                }
                progress.enter(FoldState::Training);
            }
        }

        let avg = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
        tracing::info!("fold {} epoch {:>3}/{} | train_loss={:.4}", plan.fold, epoch, cfg.epochs, avg);
    }

    progress.enter(FoldState::Done);
    if best.is_none() && status != FoldStatus::Cancelled {
        persist(&artifact, cfg, model_cfg, &model)?;
        saved = true;
        tracing::info!("fold {}: no evaluation improved, saved final state", plan.fold);
    }

    let report = FoldReport {
        fold:         plan.fold,
        artifact_dir: artifact.dir().to_path_buf(),
        best_metric:  best.map(|(m, _)| m),
        best_step:    best.map(|(_, s)| s),
        steps:        step,
        status,
        saved,
    };
    if saved {
        artifact.save_report(&report)?;
    }
    Ok(report)
}

/// Write model weights and the configs needed to load them.
fn persist<B: Backend>(
    artifact:  &CheckpointManager,
    cfg:       &TrainConfig,
    model_cfg: &ReClassifierConfig,
    model:     &ReClassifier<B>,
) -> Result<()> {
    artifact.save_model_config(model_cfg)?;
    artifact.save_config(cfg)?;
    artifact.save_model(model)
}

/// Predict every validation batch and score against gold labels.
pub fn evaluate<B: Backend>(
    model:  &ReClassifier<B>,
    loader: &Arc<dyn DataLoader<ReBatch<B>>>,
) -> Result<ClassificationReport> {
    let mut predictions = Vec::new();
    let mut gold        = Vec::new();
    for batch in loader.iter() {
        let pred = model.predict(batch.input_ids, batch.attention_mask, batch.token_type_ids);
        predictions.extend(ids_from_tensor(pred)?);
        gold.extend(ids_from_tensor(batch.labels)?);
    }
    Ok(ClassificationReport::compute(&predictions, &gold, NUM_LABELS))
}
