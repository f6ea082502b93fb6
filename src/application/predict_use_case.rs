// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Rebuilds the training pipeline from the first fold's saved
// config, runs every fold model over the input csv and writes
// one hard-voted label per record:
//
//   Step 1: Read <run_name>_1/train_config.json
//   Step 2: Load + mark records with the trained strategy
//   Step 3: Load the saved tokenizer, re-register markers
//   Step 4: Load <run_name>_1 … <run_name>_K and vote
//   Step 5: Write id,pred_label rows

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

use crate::application::train_use_case::{encode_dataset, DeviceKind, TrainConfig};
use crate::data::{
    dataset::ReDataset,
    loader::{prepare_all, CsvRecordLoader},
    marker::EntityMarker,
    pairing::TokenizationAdapter,
};
use crate::domain::{label::LabelSpace, traits::RecordSource};
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{apply_contract, register_special_tokens, TokenizerStore},
};
use crate::ml::ensemble::EnsemblePredictor;

#[derive(Debug, Serialize)]
struct PredictionRow<'a> {
    id:         &'a str,
    pred_label: &'static str,
}

pub struct PredictUseCase {
    pub data_path:  PathBuf,
    pub output_dir: PathBuf,
    pub run_name:   String,
    pub out_path:   PathBuf,
    /// Overrides the batch size saved with the run
    pub batch_size: Option<usize>,
    pub device:     Option<DeviceKind>,
}

impl PredictUseCase {
    /// Returns the voted label name of every input record, in input order.
    pub fn execute(&self) -> Result<Vec<(String, &'static str)>> {
        // ── Step 1: Saved configuration ───────────────────────────────────────
        let cfg: TrainConfig = CheckpointManager::for_fold(&self.output_dir, &self.run_name, 1)
            .load_config()
            .with_context(|| format!("Run '{}' has no first fold under '{}'", self.run_name, self.output_dir.display()))?;

        // ── Step 2: Records ───────────────────────────────────────────────────
        let records  = CsvRecordLoader::new(&self.data_path).load_all()?;
        let prepared = prepare_all(&records, &EntityMarker::new(cfg.strategy))?;

        // Unlabelled test sets carry placeholder labels; they only fill the batch.
        let labels: Vec<usize> = prepared
            .iter()
            .map(|r| LabelSpace::id_of(&r.label).unwrap_or(0))
            .collect();

        // ── Step 3: Tokenizer ─────────────────────────────────────────────────
        let adapter   = TokenizationAdapter::new();
        let tokenizer = load_trained_tokenizer(&cfg, &adapter)?;
        let dataset   = encode_dataset(&tokenizer, &adapter, &prepared, labels)?;

        // ── Step 4: Vote ──────────────────────────────────────────────────────
        let batch_size = self.batch_size.unwrap_or(cfg.batch_size);
        let device     = self.device.unwrap_or(cfg.device);
        let voted      = predict_on_device(device, &self.output_dir, &self.run_name, &dataset, batch_size)?;

        let named: Vec<(String, &'static str)> = prepared
            .iter()
            .zip(&voted)
            .map(|(r, &id)| -> Result<(String, &'static str)> {
                let name = LabelSpace::name_of(id).ok_or_else(|| anyhow::anyhow!("Model produced label id {id}"))?;
                Ok((r.id.clone(), name))
            })
            .collect::<Result<_>>()?;

        // ── Step 5: Write ─────────────────────────────────────────────────────
        write_predictions(&self.out_path, &named)?;
        tracing::info!("Wrote {} predictions to '{}'", named.len(), self.out_path.display());
        Ok(named)
    }
}

/// The tokenizer saved by training, with the strategy's markers added
/// in the same order so they receive the same ids.
fn load_trained_tokenizer(cfg: &TrainConfig, adapter: &TokenizationAdapter) -> Result<Tokenizer> {
    let mut tokenizer = TokenizerStore::new(&cfg.tokenizer_dir).load()?;
    register_special_tokens(&mut tokenizer, &cfg.strategy.special_tokens());
    apply_contract(&mut tokenizer, &adapter.contract())?;
    Ok(tokenizer)
}

fn predict_on_device(
    device:     DeviceKind,
    output_dir: &Path,
    run_name:   &str,
    dataset:    &ReDataset,
    batch_size: usize,
) -> Result<Vec<usize>> {
    use burn::backend::{ndarray::NdArrayDevice, NdArray};

    if device == DeviceKind::Gpu {
        #[cfg(feature = "gpu")]
        {
            use burn::backend::{wgpu::WgpuDevice, Wgpu};
            let predictor = EnsemblePredictor::<Wgpu>::from_artifacts(output_dir, run_name, WgpuDevice::default())?;
            return predictor.predict(dataset, batch_size);
        }
        #[cfg(not(feature = "gpu"))]
        tracing::warn!("GPU requested but this build lacks the `gpu` feature; using host compute");
    }

    let predictor = EnsemblePredictor::<NdArray>::from_artifacts(output_dir, run_name, NdArrayDevice::default())?;
    predictor.predict(dataset, batch_size)
}

fn write_predictions(path: &Path, rows: &[(String, &'static str)]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    for (id, label) in rows {
        writer.serialize(PredictionRow { id, pred_label: *label })?;
    }
    writer.flush()?;
    Ok(())
}
