// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with `clap` and routes each subcommand to
// its Layer 2 use case:
//
//   1. `prepare` — write the entity-marked table
//   2. `train`   — k-fold training, one artifact dir per fold
//   3. `predict` — hard-vote every fold over a csv
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, PredictArgs, PrepareArgs, TrainArgs};

use crate::application::{
    predict_use_case::PredictUseCase,
    prepare_use_case::PrepareUseCase,
    train_use_case::{TrainConfig, TrainUseCase},
};
use crate::ml::trainer::{CancelFlag, FoldStatus};

#[derive(Parser, Debug)]
#[command(
    name = "klue-re",
    version = "0.1.0",
    about = "Entity-marked relation extraction: prepare data, train a k-fold ensemble, predict by hard vote."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. This layer only routes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Prepare(args) => run_prepare(args),
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    let rows = PrepareUseCase::new(args.data_path, &args.out_path, args.strategy).execute()?;
    println!("Wrote {} marked rows to {}", rows, args.out_path.display());
    Ok(())
}

fn train_config(args: TrainArgs) -> Result<TrainConfig> {
    match &args.config {
        Some(path) => {
            tracing::info!("Reading training config from '{}'", path.display());
            TrainConfig::from_json_file(path)
        }
        None => Ok(args.into()),
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = train_config(args)?;
    tracing::info!(
        "Training '{}' on {} ({} folds, strategy '{}', loss '{}')",
        config.run_name, config.data_path, config.num_folds, config.strategy, config.loss
    );

    let use_case = TrainUseCase::new(config);
    if let Err(e) = cancel_on_ctrl_c(use_case.cancel_flag()) {
        tracing::warn!("Ctrl-C will not stop training cleanly: {:#}", e);
    }
    let reports = use_case.execute()?;
    let saved   = reports.iter().filter(|r| r.saved).count();
    println!("Training complete. {saved}/{} fold artifacts saved.", reports.len());
    if reports.iter().any(|r| r.status == FoldStatus::Cancelled) {
        println!("Run was cancelled before every fold finished.");
    }
    Ok(())
}

/// First Ctrl-C stops training at the next step boundary; a second one exits.
fn cancel_on_ctrl_c(cancel: CancelFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Cannot start signal runtime")?;

    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                    return;
                }
                tracing::warn!("Ctrl-C received, stopping after the current step");
                cancel.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Second Ctrl-C, exiting without waiting for the fold");
                    std::process::exit(130);
                }
            })
        })
        .context("Cannot spawn signal thread")?;
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let use_case = PredictUseCase {
        data_path:  args.data_path,
        output_dir: args.output_dir,
        run_name:   args.run_name,
        out_path:   args.out_path,
        batch_size: args.batch_size,
        device:     args.device,
    };
    let rows = use_case.execute()?;
    println!("Wrote {} predictions to {}", rows.len(), use_case.out_path.display());
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::DeviceKind;
    use crate::data::marker::MarkerStrategy;
    use crate::ml::loss::LossKind;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("klue-re").chain(args.iter().copied()))
    }

    #[test]
    fn test_train_flags_become_config() {
        let cli = parse(&["train", "--strategy", "token_with_type", "--loss", "label_smoothing:0.2",
                          "--num-folds", "5", "--patience", "3", "--no-tracking"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = train_config(args).unwrap();
        assert_eq!(cfg.strategy, MarkerStrategy::TokenWithType);
        assert_eq!(cfg.loss, LossKind::LabelSmoothing { factor: 0.2 });
        assert_eq!(cfg.num_folds, 5);
        assert_eq!(cfg.early_stopping_patience, Some(3));
        assert!(!cfg.tracking);
        assert_eq!(cfg.device, DeviceKind::Cpu);
    }

    #[test]
    fn test_flag_defaults_match_config_defaults() {
        let Commands::Train(args) = parse(&["train"]).unwrap().command else { panic!("expected train") };
        let from_flags = train_config(args).unwrap();
        let defaults   = TrainConfig::default();
        assert_eq!(serde_json::to_value(&from_flags).unwrap(), serde_json::to_value(&defaults).unwrap());
    }

    #[test]
    fn test_unknown_names_rejected_at_parse_time() {
        assert!(parse(&["train", "--strategy", "bold"]).is_err());
        assert!(parse(&["train", "--loss", "focal"]).is_err());
        assert!(parse(&["prepare", "--strategy", "bold"]).is_err());
        assert!(parse(&["predict", "--device", "tpu"]).is_err());
    }

    #[test]
    fn test_ctrl_c_listener_leaves_flag_clear() {
        let flag = CancelFlag::new();
        cancel_on_ctrl_c(flag.clone()).unwrap();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn test_config_file_overrides_flags() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"run_name": "from_file", "epochs": 2}"#).unwrap();

        let cli = parse(&["train", "--config", path.to_str().unwrap(), "--run-name", "from_flags"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg = train_config(args).unwrap();
        assert_eq!(cfg.run_name, "from_file");
        assert_eq!(cfg.epochs, 2);
    }
}
