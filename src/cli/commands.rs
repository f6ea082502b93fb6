// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `prepare`, `train` and
// `predict`, with all their configurable flags.
//
// Strategy, loss, decay, metric and device flags parse through
// their FromStr impls, so a bad name is rejected by clap before
// any data is read.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::train_use_case::{DeviceKind, TrainConfig};
use crate::data::marker::MarkerStrategy;
use crate::ml::{evaluation::CheckpointMetric, loss::LossKind, schedule::DecayShape};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mark entity spans and write the rewritten table as csv
    Prepare(PrepareArgs),

    /// Train a stratified k-fold ensemble
    Train(TrainArgs),

    /// Predict a csv with every fold of a run and hard-vote
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[arg(long, default_value = "dataset/train/train.csv")]
    pub data_path: PathBuf,

    /// Where the marked csv is written
    #[arg(long, default_value = "prepared/train_marked.csv")]
    pub out_path: PathBuf,

    /// punct_star | suffix_kr | punct_kr | punct_kr_subject_object |
    /// token | token_with_type | swap_token_with_type | default
    #[arg(long, default_value = "default")]
    pub strategy: MarkerStrategy,
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file holding a full or partial TrainConfig; flags are ignored when set
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "dataset/train/train.csv")]
    pub data_path: String,

    /// Fold artifacts land in <output_dir>/<run_name>_<k>
    #[arg(long, default_value = "best_model")]
    pub output_dir: String,

    #[arg(long, default_value = "klue_re")]
    pub run_name: String,

    /// Directory holding tokenizer.json; built from the corpus when missing
    #[arg(long, default_value = "tokenizer")]
    pub tokenizer_dir: String,

    #[arg(long, default_value = "default")]
    pub strategy: MarkerStrategy,

    #[arg(long, default_value_t = 3)]
    pub num_folds: usize,

    /// Stratified holdout share, only used with --num-folds 1
    #[arg(long)]
    pub valid_fraction: Option<f64>,

    #[arg(long, default_value_t = 4)]
    pub epochs: usize,

    /// Hard cap on optimizer steps per fold
    #[arg(long)]
    pub max_steps: Option<usize>,

    #[arg(long, default_value_t = 2e-5)]
    pub lr: f64,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 300)]
    pub warmup_steps: usize,

    /// linear | cosine
    #[arg(long, default_value = "cosine")]
    pub decay: DecayShape,

    /// cross_entropy | label_smoothing[:factor] | class_balanced_margin
    #[arg(long, default_value = "cross_entropy")]
    pub loss: LossKind,

    /// Steps between train/loss rows in metrics.csv
    #[arg(long, default_value_t = 100)]
    pub logging_steps: usize,

    #[arg(long, default_value_t = 500)]
    pub eval_interval_steps: usize,

    /// micro_f1 | macro_f1 | accuracy
    #[arg(long, default_value = "micro_f1")]
    pub checkpoint_metric: CheckpointMetric,

    /// Stop a fold after this many evaluations without improvement
    #[arg(long)]
    pub patience: Option<usize>,

    #[arg(long, default_value_t = 1004)]
    pub seed: u64,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// cpu | gpu
    #[arg(long, default_value = "cpu")]
    pub device: DeviceKind,

    /// Skip writing metrics.csv
    #[arg(long)]
    pub no_tracking: bool,

    /// Vocabulary size when a tokenizer has to be built
    #[arg(long, default_value_t = 32000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 4)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_path:               a.data_path,
            output_dir:              a.output_dir,
            run_name:                a.run_name,
            tokenizer_dir:           a.tokenizer_dir,
            strategy:                a.strategy,
            num_folds:               a.num_folds,
            valid_fraction:          a.valid_fraction,
            epochs:                  a.epochs,
            max_steps:               a.max_steps,
            learning_rate:           a.lr,
            weight_decay:            a.weight_decay,
            batch_size:              a.batch_size,
            warmup_steps:            a.warmup_steps,
            decay:                   a.decay,
            loss:                    a.loss,
            logging_steps:           a.logging_steps,
            eval_interval_steps:     a.eval_interval_steps,
            checkpoint_metric:       a.checkpoint_metric,
            early_stopping_patience: a.patience,
            seed:                    a.seed,
            num_workers:             a.num_workers,
            device:                  a.device,
            tracking:                !a.no_tracking,
            vocab_size:              a.vocab_size,
            d_model:                 a.d_model,
            num_heads:               a.num_heads,
            num_layers:              a.num_layers,
            d_ff:                    a.d_ff,
            dropout:                 a.dropout,
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[arg(long, default_value = "dataset/test/test_data.csv")]
    pub data_path: PathBuf,

    /// Directory that holds the run's fold artifacts
    #[arg(long, default_value = "best_model")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "klue_re")]
    pub run_name: String,

    #[arg(long, default_value = "prediction/submission.csv")]
    pub out_path: PathBuf,

    /// Defaults to the batch size the run was trained with
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Defaults to the device the run was trained on
    #[arg(long)]
    pub device: Option<DeviceKind>,
}
