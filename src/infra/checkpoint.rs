// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// One manager per fold artifact directory:
//
//   <output_dir>/
//     <run_name>_1/
//       model.mpk             ← best (or final) weights
//       model_config.json     ← classifier architecture
//       train_config.json     ← full training configuration
//       fold_report.json      ← best metric, steps, status
//     <run_name>_2/
//     ...
//
// Weights go through Burn's CompactRecorder (named MessagePack,
// half precision). Each fold directory has exactly one
// writer: the fold that owns it.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::{ReClassifier, ReClassifierConfig};

const MODEL_FILE:        &str = "model";
/// Extension CompactRecorder appends to `MODEL_FILE`.
const MODEL_EXTENSION:   &str = "mpk";
const MODEL_CONFIG_FILE: &str = "model_config.json";
const TRAIN_CONFIG_FILE: &str = "train_config.json";
const REPORT_FILE:       &str = "fold_report.json";

/// Directory name of fold `fold` (1-based) of run `run_name`.
pub fn fold_dir_name(run_name: &str, fold: usize) -> String {
    format!("{run_name}_{fold}")
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Manager for `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create artifact dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Manager for one fold of a run, without touching the filesystem.
    pub fn for_fold(output_dir: &Path, run_name: &str, fold: usize) -> Self {
        Self { dir: output_dir.join(fold_dir_name(run_name, fold)) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn has_model(&self) -> bool {
        self.dir.join(format!("{MODEL_FILE}.{MODEL_EXTENSION}")).is_file()
    }

    pub fn save_model<B: Backend>(&self, model: &ReClassifier<B>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create artifact dir '{}'", self.dir.display()))?;
        let path = self.dir.join(MODEL_FILE);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved checkpoint to '{}'", path.display());
        Ok(())
    }

    /// Restore saved weights into a model built from the saved config.
    pub fn load_model<B: Backend>(&self, device: &B::Device) -> Result<ReClassifier<B>> {
        let model_cfg: ReClassifierConfig = self.read_json(MODEL_CONFIG_FILE)?;
        let model: ReClassifier<B>        = model_cfg.init(device);
        let path = self.dir.join(MODEL_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;
        Ok(model.load_record(record))
    }

    pub fn save_model_config(&self, cfg: &ReClassifierConfig) -> Result<()> {
        self.write_json(MODEL_CONFIG_FILE, cfg)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(TRAIN_CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json(TRAIN_CONFIG_FILE)
    }

    pub fn save_report<T: Serialize>(&self, report: &T) -> Result<()> {
        self.write_json(REPORT_FILE, report)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create artifact dir '{}'", self.dir.display()))?;
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(value)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'. Has this fold been trained?", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Cannot parse '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn tiny() -> ReClassifierConfig {
        ReClassifierConfig::new(16, 8, 8, 2, 1, 16).with_dropout(0.0)
    }

    #[test]
    fn test_fold_dir_name() {
        assert_eq!(fold_dir_name("ldam_ep4", 2), "ldam_ep4_2");
        let m = CheckpointManager::for_fold(Path::new("/tmp/out"), "r", 3);
        assert_eq!(m.dir(), Path::new("/tmp/out/r_3"));
    }

    #[test]
    fn test_model_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let ckpt   = CheckpointManager::new(dir.path().join("run_1")).unwrap();
        let device = Default::default();
        let model: ReClassifier<NdArray> = tiny().init(&device);

        assert!(!ckpt.has_model());
        ckpt.save_model_config(&tiny()).unwrap();
        ckpt.save_model(&model).unwrap();
        assert!(ckpt.has_model());

        let loaded: ReClassifier<NdArray> = ckpt.load_model(&device).unwrap();
        assert_eq!(loaded.num_labels(), model.num_labels());
    }

    #[test]
    fn test_weights_file_matches_recorder() {
        use burn::record::FileRecorder;
        assert_eq!(<CompactRecorder as FileRecorder<NdArray>>::file_extension(), MODEL_EXTENSION);

        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let model: ReClassifier<NdArray> = tiny().init(&Default::default());
        ckpt.save_model(&model).unwrap();
        assert!(dir.path().join("model.mpk").is_file());
        assert!(ckpt.has_model());
    }

    #[test]
    fn test_config_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        let cfg  = TrainConfig::default();
        ckpt.save_config(&cfg).unwrap();
        assert_eq!(ckpt.load_config().unwrap().run_name, cfg.run_name);
    }

    #[test]
    fn test_missing_config_is_error() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        assert!(ckpt.load_config().is_err());
    }
}
