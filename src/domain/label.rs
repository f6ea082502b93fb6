// ============================================================
// Layer 3 — Relation Label Space
// ============================================================
// The 30 KLUE relation classes, in the fixed id order the
// classifier head is trained against. Id 0 is "no_relation".

use serde::{Deserialize, Serialize};

use crate::domain::error::ReError;

pub const NUM_LABELS: usize = 30;

pub const LABELS: [&str; NUM_LABELS] = [
    "no_relation",
    "org:top_members/employees",
    "org:members",
    "org:product",
    "per:title",
    "org:alternate_names",
    "per:employee_of",
    "org:place_of_headquarters",
    "per:product",
    "org:number_of_employees/members",
    "per:children",
    "per:place_of_residence",
    "per:alternate_names",
    "per:other_family",
    "per:colleagues",
    "per:origin",
    "per:siblings",
    "per:spouse",
    "org:founded",
    "org:political/religious_affiliation",
    "org:member_of",
    "per:parents",
    "org:dissolved",
    "per:schools_attended",
    "per:date_of_death",
    "per:date_of_birth",
    "per:place_of_birth",
    "per:place_of_death",
    "org:founded_by",
    "per:religion",
];

/// Maps between label names and integer ids in `[0, NUM_LABELS)`.
pub struct LabelSpace;

impl LabelSpace {
    pub fn id_of(name: &str) -> Result<usize, ReError> {
        LABELS
            .iter()
            .position(|l| *l == name)
            .ok_or_else(|| ReError::UnknownLabel(name.to_string()))
    }

    pub fn name_of(id: usize) -> Option<&'static str> {
        LABELS.get(id).copied()
    }

    pub fn ids_of<S: AsRef<str>>(names: &[S]) -> Result<Vec<usize>, ReError> {
        names.iter().map(|n| Self::id_of(n.as_ref())).collect()
    }
}

// ─── LabelFrequencyTable ──────────────────────────────────────────────────────
/// Occurrence count of every label id in one example collection.
/// All 30 ids are always present; absent labels count 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFrequencyTable {
    counts: Vec<usize>,
}

impl LabelFrequencyTable {
    /// Count `labels`. Ids outside the label space are ignored; the dataset
    /// rejects them before this is reached.
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut counts = vec![0usize; NUM_LABELS];
        for &l in labels {
            if let Some(c) = counts.get_mut(l) {
                *c += 1;
            }
        }
        Self { counts }
    }

    pub fn get(&self, label: usize) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Counts indexed by label id.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts.iter().copied().enumerate()
    }
}
