use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::error::ReError;
use crate::domain::label::{LabelFrequencyTable, NUM_LABELS};

/// Tokenizer output for one (query, sentence) pair.
/// Format: [CLS] query [SEP] sentence [SEP] [PAD]...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedFeatures {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
}

impl TokenizedFeatures {
    pub fn seq_len(&self) -> usize {
        self.input_ids.len()
    }
}

/// One labeled example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReSample {
    pub features: TokenizedFeatures,
    pub label:    usize,
}

/// Aligned features and labels plus the label counts over them.
/// The frequency table is computed once, when the dataset is built.
#[derive(Debug, Clone)]
pub struct ReDataset {
    samples:     Vec<ReSample>,
    frequencies: LabelFrequencyTable,
}

impl ReDataset {
    pub fn new(features: Vec<TokenizedFeatures>, labels: Vec<usize>) -> Result<Self, ReError> {
        if features.len() != labels.len() {
            return Err(ReError::MisalignedColumns { features: features.len(), labels: labels.len() });
        }
        let samples = features
            .into_iter()
            .zip(labels)
            .map(|(features, label)| ReSample { features, label })
            .collect();
        Self::from_samples(samples)
    }

    pub fn from_samples(samples: Vec<ReSample>) -> Result<Self, ReError> {
        if let Some(bad) = samples.iter().find(|s| s.label >= NUM_LABELS) {
            return Err(ReError::UnknownLabel(bad.label.to_string()));
        }
        let labels: Vec<usize> = samples.iter().map(|s| s.label).collect();
        let frequencies        = LabelFrequencyTable::from_labels(&labels);
        Ok(Self { samples, frequencies })
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }

    pub fn get(&self, index: usize) -> Result<&ReSample, ReError> {
        self.samples
            .get(index)
            .ok_or(ReError::IndexOutOfRange { index, len: self.samples.len() })
    }

    pub fn label_frequencies(&self) -> &LabelFrequencyTable {
        &self.frequencies
    }

    pub fn labels(&self) -> Vec<usize> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// A new dataset holding the examples at `indices`, with its own counts.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, ReError> {
        let samples = indices
            .iter()
            .map(|&i| self.get(i).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_samples(samples)
    }
}

impl Dataset<ReSample> for ReDataset {
    fn get(&self, index: usize) -> Option<ReSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
