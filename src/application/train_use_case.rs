// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load csv records            (Layer 4 - data)
//   Step 2: Mark entity spans           (Layer 4 - data)
//   Step 3: Map labels to ids           (Layer 3 - domain)
//   Step 4: Build (query, sentence)     (Layer 4 - data)
//   Step 5: Load / build tokenizer      (Layer 6 - infra)
//   Step 6: Encode pairs into dataset   (Layer 4/6)
//   Step 7: Open tracking sink          (Layer 6 - infra)
//   Step 8: Run the fold ensemble       (Layer 5 - ml)
//   Step 9: Write the run summary       (Layer 6 - infra)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};
use tokenizers::Tokenizer;

use crate::data::{
    dataset::ReDataset,
    loader::{prepare_all, CsvRecordLoader},
    marker::{EntityMarker, MarkerStrategy},
    pairing::TokenizationAdapter,
};
use crate::domain::{
    label::{LabelSpace, LABELS},
    record::PreparedRecord,
    traits::RecordSource,
};
use crate::infra::{
    tokenizer_store::{apply_contract, embedding_rows, encode_pairs, register_special_tokens, TokenizerStore},
    tracking::{CsvTrackingSink, Tracker},
};
use crate::ml::{
    evaluation::CheckpointMetric,
    loss::LossKind,
    schedule::DecayShape,
    trainer::{run_ensemble, CancelFlag, FoldReport},
};

// ─── Device Selection ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Gpu => "gpu",
        })
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(DeviceKind::Cpu),
            "gpu" => Ok(DeviceKind::Gpu),
            other => Err(format!("unknown device '{other}' (expected cpu or gpu)")),
        }
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
// Every knob for one training run. Saved next to each fold's
// weights so prediction can rebuild the same pipeline. Missing
// keys in a --config file take their default values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_path:      String,
    pub output_dir:     String,
    pub run_name:       String,
    pub tokenizer_dir:  String,
    pub strategy:       MarkerStrategy,

    pub num_folds:      usize,
    /// Holdout share when `num_folds == 1`; `None` evaluates on the training data.
    pub valid_fraction: Option<f64>,
    pub epochs:         usize,
    pub max_steps:      Option<usize>,
    pub learning_rate:  f64,
    pub weight_decay:   f64,
    pub batch_size:     usize,
    pub warmup_steps:   usize,
    pub decay:          DecayShape,
    pub loss:           LossKind,

    /// Steps between train/loss and train/lr rows (mean loss over the window)
    pub logging_steps:           usize,
    pub eval_interval_steps:     usize,
    pub checkpoint_metric:       CheckpointMetric,
    pub early_stopping_patience: Option<usize>,

    pub seed:           u64,
    pub num_workers:    usize,
    pub device:         DeviceKind,
    pub tracking:       bool,

    /// Vocabulary size when a tokenizer has to be built from the corpus
    pub vocab_size:     usize,
    pub d_model:        usize,
    pub num_heads:      usize,
    pub num_layers:     usize,
    pub d_ff:           usize,
    pub dropout:        f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_path:      "dataset/train/train.csv".to_string(),
            output_dir:     "best_model".to_string(),
            run_name:       "klue_re".to_string(),
            tokenizer_dir:  "tokenizer".to_string(),
            strategy:       MarkerStrategy::Default,

            num_folds:      3,
            valid_fraction: None,
            epochs:         4,
            max_steps:      None,
            learning_rate:  2e-5,
            weight_decay:   0.01,
            batch_size:     16,
            warmup_steps:   300,
            decay:          DecayShape::Cosine,
            loss:           LossKind::CrossEntropy,

            logging_steps:           100,
            eval_interval_steps:     500,
            checkpoint_metric:       CheckpointMetric::MicroF1,
            early_stopping_patience: None,

            seed:           1004,
            num_workers:    1,
            device:         DeviceKind::Cpu,
            tracking:       true,

            vocab_size:     32000,
            d_model:        256,
            num_heads:      8,
            num_layers:     4,
            d_ff:           1024,
            dropout:        0.1,
        }
    }
}

impl TrainConfig {
    /// Read a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Cannot parse config '{}'", path.display()))
    }

    /// Reject settings the trainer cannot run with.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.num_folds >= 1, "num_folds must be at least 1");
        anyhow::ensure!(self.batch_size >= 1, "batch_size must be at least 1");
        anyhow::ensure!(self.eval_interval_steps >= 1, "eval_interval_steps must be at least 1");
        anyhow::ensure!(self.logging_steps >= 1, "logging_steps must be at least 1");
        anyhow::ensure!(
            self.d_model % self.num_heads.max(1) == 0,
            "d_model ({}) must be divisible by num_heads ({})",
            self.d_model,
            self.num_heads
        );
        if let Some(p) = self.valid_fraction {
            anyhow::ensure!(p > 0.0 && p < 1.0, "valid_fraction must lie in (0, 1), got {p}");
        }
        self.loss.check()?;
        Ok(())
    }
}

// ─── Shared Encoding Pipeline ────────────────────────────────────────────────
/// Tokenizer configured for `strategy`: marker tokens registered, pair contract applied.
pub fn prepare_tokenizer(
    store:    &TokenizerStore,
    adapter:  &TokenizationAdapter,
    strategy: MarkerStrategy,
    corpus:   &[String],
    vocab:    usize,
) -> Result<Tokenizer> {
    let mut tokenizer = store.load_or_build(corpus, vocab)?;
    let added = register_special_tokens(&mut tokenizer, &strategy.special_tokens());
    if added > 0 {
        tracing::info!("Added {} marker tokens for strategy '{}'", added, strategy);
    }
    apply_contract(&mut tokenizer, &adapter.contract())?;
    Ok(tokenizer)
}

/// Encode prepared records into a dataset with the given label ids.
pub fn encode_dataset(
    tokenizer: &Tokenizer,
    adapter:   &TokenizationAdapter,
    prepared:  &[PreparedRecord],
    labels:    Vec<usize>,
) -> Result<ReDataset> {
    let (queries, sentences) = adapter.build_pairs(prepared);
    let features = encode_pairs(tokenizer, &adapter.contract(), &queries, &sentences)?;
    Ok(ReDataset::new(features, labels)?)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    cancel: CancelFlag,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config, cancel: CancelFlag::new() }
    }

    /// Handle that stops training at the next step boundary.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<Vec<FoldReport>> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Load records ──────────────────────────────────────────────
        let records = CsvRecordLoader::new(&cfg.data_path).load_all()?;
        anyhow::ensure!(
            records.len() >= cfg.num_folds,
            "{} records cannot fill {} folds",
            records.len(),
            cfg.num_folds
        );

        // ── Step 2: Apply the marker strategy ─────────────────────────────────
        let marker   = EntityMarker::new(cfg.strategy);
        let prepared = prepare_all(&records, &marker)?;
        tracing::info!("Marked {} sentences with strategy '{}'", prepared.len(), cfg.strategy);

        // ── Step 3: Label names → ids ─────────────────────────────────────────
        let names: Vec<&str> = prepared.iter().map(|r| r.label.as_str()).collect();
        let labels = LabelSpace::ids_of(&names)?;

        // ── Step 4/5: Pairs and tokenizer ─────────────────────────────────────
        let adapter = TokenizationAdapter::new();
        let (queries, sentences) = adapter.build_pairs(&prepared);
        let corpus: Vec<String> = queries.iter().chain(sentences.iter()).cloned().collect();
        let store     = TokenizerStore::new(&cfg.tokenizer_dir);
        let tokenizer = prepare_tokenizer(&store, &adapter, cfg.strategy, &corpus, cfg.vocab_size)?;
        let vocab_rows = embedding_rows(&tokenizer);

        // ── Step 6: Encode ────────────────────────────────────────────────────
        let dataset = encode_dataset(&tokenizer, &adapter, &prepared, labels)?;
        tracing::info!("Encoded {} examples (embedding rows: {})", dataset.size(), vocab_rows);
        for (id, count) in dataset.label_frequencies().iter().filter(|(_, c)| *c > 0) {
            tracing::debug!("  {:<40} {}", LABELS[id], count);
        }

        // ── Step 7: Tracking ──────────────────────────────────────────────────
        let mut tracker = if cfg.tracking {
            match CsvTrackingSink::new(Path::new(&cfg.output_dir)) {
                Ok(sink) => Tracker::new(Box::new(sink)),
                Err(e) => {
                    tracing::warn!("Tracking disabled: {:#}", e);
                    Tracker::disabled()
                }
            }
        } else {
            Tracker::disabled()
        };

        // ── Step 8: Train every fold ──────────────────────────────────────────
        let reports = train_on_device(cfg, &dataset, vocab_rows, &mut tracker, &self.cancel)?;

        // ── Step 9: Summary ───────────────────────────────────────────────────
        let summary_path = Path::new(&cfg.output_dir).join(format!("{}_summary.json", cfg.run_name));
        std::fs::create_dir_all(&cfg.output_dir)
            .with_context(|| format!("Cannot create '{}'", cfg.output_dir))?;
        std::fs::write(&summary_path, serde_json::to_string_pretty(&reports)?)
            .with_context(|| format!("Cannot write '{}'", summary_path.display()))?;

        for r in &reports {
            tracing::info!(
                "fold {} → '{}' best={} status={:?}",
                r.fold,
                r.artifact_dir.display(),
                r.best_metric.map_or("n/a".to_string(), |m| format!("{m:.4}")),
                r.status,
            );
        }
        Ok(reports)
    }
}

/// Pick the backend once per process and run the ensemble on it.
fn train_on_device(
    cfg:        &TrainConfig,
    dataset:    &ReDataset,
    vocab_rows: usize,
    tracker:    &mut Tracker,
    cancel:     &CancelFlag,
) -> Result<Vec<FoldReport>> {
    use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};

    if cfg.device == DeviceKind::Gpu {
        #[cfg(feature = "gpu")]
        {
            use burn::backend::{wgpu::WgpuDevice, Wgpu};
            let device = WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            return run_ensemble::<Autodiff<Wgpu>>(cfg, dataset, vocab_rows, tracker, cancel, &device);
        }
        #[cfg(not(feature = "gpu"))]
        tracing::warn!("GPU requested but this build lacks the `gpu` feature; using host compute");
    }

    let device = NdArrayDevice::default();
    tracing::info!("Using NdArray device: {:?}", device);
    run_ensemble::<Autodiff<NdArray>>(cfg, dataset, vocab_rows, tracker, cancel, &device)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const HEADER: &str = "id,sentence,subject_entity,object_entity,label,source\n";

    fn write_csv(dir: &Path, rows: usize) -> String {
        let mut csv = HEADER.to_string();
        for i in 0..rows {
            let label = if i % 2 == 0 { "per:colleagues" } else { "no_relation" };
            csv.push_str(&format!(
                "{i},영희는 철수의 친구이다.,\"{{'word': '영희', 'start_idx': 0, 'end_idx': 2, 'type': 'PER'}}\",\"{{'word': '철수', 'start_idx': 4, 'end_idx': 6, 'type': 'PER'}}\",{label},wikipedia\n"
            ));
        }
        let path = dir.join("train.csv");
        fs::write(&path, csv).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn tiny(dir: &Path) -> TrainConfig {
        TrainConfig {
            data_path:           write_csv(dir, 8),
            output_dir:          dir.join("out").to_string_lossy().into_owned(),
            tokenizer_dir:       dir.join("tok").to_string_lossy().into_owned(),
            run_name:            "t".to_string(),
            num_folds:           2,
            epochs:              1,
            batch_size:          4,
            warmup_steps:        0,
            eval_interval_steps: 1,
            vocab_size:          64,
            d_model:             8,
            num_heads:           2,
            num_layers:          1,
            d_ff:                16,
            dropout:             0.0,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_defaults_follow_reference_run() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.num_folds, 3);
        assert_eq!(cfg.seed, 1004);
        assert_eq!(cfg.strategy, MarkerStrategy::Default);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_json_config() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"run_name": "ldam", "strategy": "token", "loss": {"kind": "class_balanced_margin", "max_margin": 0.5, "scale": 30.0}}"#).unwrap();
        let cfg = TrainConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.run_name, "ldam");
        assert_eq!(cfg.strategy, MarkerStrategy::Token);
        assert!(matches!(cfg.loss, LossKind::ClassBalancedMargin { .. }));
        assert_eq!(cfg.epochs, 4);
    }

    #[test]
    fn test_unknown_strategy_in_config_fails() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"strategy": "bold"}"#).unwrap();
        assert!(TrainConfig::from_json_file(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(TrainConfig { num_folds: 0, ..TrainConfig::default() }.validate().is_err());
        assert!(TrainConfig { eval_interval_steps: 0, ..TrainConfig::default() }.validate().is_err());
        assert!(TrainConfig { logging_steps: 0, ..TrainConfig::default() }.validate().is_err());
        assert!(TrainConfig { valid_fraction: Some(1.0), ..TrainConfig::default() }.validate().is_err());
        assert!(TrainConfig { d_model: 10, num_heads: 4, ..TrainConfig::default() }.validate().is_err());
    }

    #[test]
    fn test_config_file_loss_out_of_range_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        for (name, json) in [
            ("smooth.json", r#"{"loss": {"kind": "label_smoothing", "factor": 1.5}}"#),
            ("margin.json", r#"{"loss": {"kind": "class_balanced_margin", "max_margin": 0.0, "scale": 30.0}}"#),
            ("scale.json",  r#"{"loss": {"kind": "class_balanced_margin", "max_margin": 0.5, "scale": -2.0}}"#),
        ] {
            let path = dir.path().join(name);
            fs::write(&path, json).unwrap();
            let cfg = TrainConfig::from_json_file(&path).unwrap();
            assert!(cfg.validate().is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn test_invalid_loss_aborts_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig { loss: LossKind::LabelSmoothing { factor: 1.5 }, ..tiny(dir.path()) };
        assert!(TrainUseCase::new(cfg.clone()).execute().is_err());
        assert!(!Path::new(&cfg.output_dir).join("t_1").exists());
    }

    #[test]
    fn test_end_to_end_training() {
        let dir     = tempfile::tempdir().unwrap();
        let cfg     = tiny(dir.path());
        let reports = TrainUseCase::new(cfg.clone()).execute().unwrap();

        assert_eq!(reports.len(), 2);
        let out = Path::new(&cfg.output_dir);
        assert!(out.join("t_1").join("model.mpk").exists());
        assert!(out.join("t_2").join("train_config.json").exists());
        assert!(out.join("t_summary.json").exists());
        assert!(out.join("metrics.csv").exists());
        assert!(Path::new(&cfg.tokenizer_dir).join("tokenizer.json").exists());
    }

    #[test]
    fn test_cancelled_run_writes_summary_only() {
        let dir      = tempfile::tempdir().unwrap();
        let cfg      = tiny(dir.path());
        let use_case = TrainUseCase::new(cfg.clone());
        use_case.cancel_flag().cancel();

        let reports = use_case.execute().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].saved);
        let out = Path::new(&cfg.output_dir);
        assert!(!out.join("t_1").exists());
        assert!(out.join("t_summary.json").exists());
    }

    #[test]
    fn test_unknown_label_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = tiny(dir.path());
        let csv = fs::read_to_string(&cfg.data_path).unwrap().replace("no_relation", "per:pet");
        let path = dir.path().join("bad.csv");
        fs::write(&path, csv).unwrap();
        cfg.data_path = path.to_string_lossy().into_owned();
        assert!(TrainUseCase::new(cfg).execute().is_err());
    }
}
