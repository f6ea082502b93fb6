// ============================================================
// Layer 5 — Hard-Voting Ensemble
// ============================================================
// Loads every fold artifact of a run and combines their
// discrete predictions by majority vote:
//
//   fold 1:  2  0  7
//   fold 2:  2  1  4
//   fold 3:  5  1  3
//            ─  ─  ─
//   vote:    2  1  3     (third column is a three-way tie)
//
// Ties are broken by the lowest label id, so the result never
// depends on fold order or map iteration order.

use anyhow::{Context, Result};
use std::path::Path;
use burn::{data::dataloader::DataLoaderBuilder, prelude::*};

use crate::data::{batcher::ReBatcher, dataset::ReDataset};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::{ids_from_tensor, ReClassifier};

/// Majority label among `predictions`; ties go to the lowest id.
pub fn hard_vote(predictions: &[usize]) -> Option<usize> {
    let max_label = *predictions.iter().max()?;
    let mut counts = vec![0usize; max_label + 1];
    for &p in predictions {
        counts[p] += 1;
    }
    // max_by_key keeps the last maximum, so scan from the highest id down
    counts
        .iter()
        .enumerate()
        .rev()
        .max_by_key(|&(_, &c)| c)
        .map(|(label, _)| label)
}

/// Vote column-wise over per-model prediction rows of equal length.
pub fn vote_matrix(per_model: &[Vec<usize>]) -> Result<Vec<usize>> {
    let Some(first) = per_model.first() else {
        return Ok(Vec::new());
    };
    let n = first.len();
    anyhow::ensure!(
        per_model.iter().all(|row| row.len() == n),
        "Ensemble members predicted different numbers of examples"
    );

    Ok((0..n)
        .filter_map(|i| {
            let column: Vec<usize> = per_model.iter().map(|row| row[i]).collect();
            hard_vote(&column)
        })
        .collect())
}

pub struct EnsemblePredictor<B: Backend> {
    models: Vec<ReClassifier<B>>,
    device: B::Device,
}

impl<B: Backend> EnsemblePredictor<B> {
    /// Load `<run_name>_1`, `<run_name>_2`, ... until the first fold without a model.
    pub fn from_artifacts(output_dir: &Path, run_name: &str, device: B::Device) -> Result<Self> {
        let mut models = Vec::new();
        for fold in 1.. {
            let ckpt = CheckpointManager::for_fold(output_dir, run_name, fold);
            if !ckpt.has_model() {
                break;
            }
            let model = ckpt
                .load_model::<B>(&device)
                .with_context(|| format!("Cannot load fold {fold}"))?;
            models.push(model);
        }
        anyhow::ensure!(
            !models.is_empty(),
            "No fold artifacts named '{}_<k>' under '{}'",
            run_name,
            output_dir.display()
        );
        tracing::info!("Loaded {} ensemble members", models.len());
        Ok(Self { models, device })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Per-member predictions, one row per model.
    pub fn member_predictions(&self, dataset: &ReDataset, batch_size: usize) -> Result<Vec<Vec<usize>>> {
        let loader = DataLoaderBuilder::new(ReBatcher::<B>::new(self.device.clone()))
            .batch_size(batch_size.max(1))
            .build(dataset.clone());

        let mut rows = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let mut row = Vec::with_capacity(dataset.size());
            for batch in loader.iter() {
                let pred = model.predict(batch.input_ids, batch.attention_mask, batch.token_type_ids);
                row.extend(ids_from_tensor(pred)?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Hard-voted label id for every example, in dataset order.
    pub fn predict(&self, dataset: &ReDataset, batch_size: usize) -> Result<Vec<usize>> {
        vote_matrix(&self.member_predictions(dataset, batch_size)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::TokenizedFeatures;
    use crate::ml::model::ReClassifierConfig;
    use burn::backend::NdArray;

    #[test]
    fn test_majority_wins() {
        assert_eq!(hard_vote(&[2, 2, 5]), Some(2));
        assert_eq!(hard_vote(&[5, 2, 2]), Some(2));
    }

    #[test]
    fn test_tie_goes_to_lowest_label() {
        assert_eq!(hard_vote(&[1, 2, 3]), Some(1));
        assert_eq!(hard_vote(&[3, 2, 1]), Some(1));
        assert_eq!(hard_vote(&[7, 4, 7, 4]), Some(4));
    }

    #[test]
    fn test_empty_vote() {
        assert_eq!(hard_vote(&[]), None);
        assert_eq!(vote_matrix(&[]).unwrap(), Vec::<usize>::new());
    }

    #[test]
    fn test_vote_matrix_columns() {
        let rows = vec![vec![2, 0, 7], vec![2, 1, 7], vec![5, 1, 3]];
        assert_eq!(vote_matrix(&rows).unwrap(), vec![2, 1, 7]);
        assert!(vote_matrix(&[vec![1, 2], vec![1]]).is_err());
    }

    #[test]
    fn test_predictor_loads_all_folds() {
        let dir    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = ReClassifierConfig::new(12, 16, 8, 2, 1, 16).with_dropout(0.0);
        for fold in 1..=3 {
            let ckpt = CheckpointManager::for_fold(dir.path(), "run", fold);
            let model: ReClassifier<NdArray> = cfg.init(&device);
            ckpt.save_model_config(&cfg).unwrap();
            ckpt.save_model(&model).unwrap();
        }

        let predictor = EnsemblePredictor::<NdArray>::from_artifacts(dir.path(), "run", device).unwrap();
        assert_eq!(predictor.len(), 3);

        let features = (0..5)
            .map(|i| TokenizedFeatures {
                input_ids:      vec![2, 4 + i, 3],
                attention_mask: vec![1, 1, 1],
                token_type_ids: vec![0, 0, 1],
            })
            .collect();
        let dataset = ReDataset::new(features, vec![0; 5]).unwrap();
        let rows    = predictor.member_predictions(&dataset, 2).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 5));
        assert_eq!(predictor.predict(&dataset, 2).unwrap().len(), 5);
    }

    #[test]
    fn test_missing_artifacts_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EnsemblePredictor::<NdArray>::from_artifacts(dir.path(), "run", Default::default()).is_err());
    }
}
