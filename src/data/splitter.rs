// ============================================================
// Layer 4 — Stratified Splitter
// ============================================================
// Splits example indices into folds while keeping each label's
// share roughly equal in every fold.
//
// Stratified k-fold assignment:
//   1. Group indices by label (labels visited in ascending id).
//   2. Shuffle each group with a StdRng seeded from `seed`.
//   3. Deal each group round-robin over the folds, continuing
//      from the fold where the previous group stopped.
//
// Step 3 gives every label per-fold counts that differ by at
// most one, and keeps total fold sizes within one of each other.
// The assignment depends only on `seed` and the label sequence.
//
// Reference: rand crate documentation (SeedableRng, SliceRandom)

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::domain::label::NUM_LABELS;

/// One train/validation pair of index lists (both sorted ascending).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    pub train: Vec<usize>,
    pub valid: Vec<usize>,
}

/// Shuffled index groups, one per label id.
fn label_groups(labels: &[usize], rng: &mut StdRng) -> Vec<Vec<usize>> {
    let groups_len = labels.iter().copied().max().map_or(NUM_LABELS, |m| (m + 1).max(NUM_LABELS));
    let mut groups = vec![Vec::new(); groups_len];
    for (i, &l) in labels.iter().enumerate() {
        groups[l].push(i);
    }
    for g in &mut groups {
        g.shuffle(rng);
    }
    groups
}

/// Fold id for every example index.
pub fn stratified_fold_assignment(labels: &[usize], num_folds: usize, seed: u64) -> Vec<usize> {
    let num_folds  = num_folds.max(1);
    let mut rng    = StdRng::seed_from_u64(seed);
    let mut folds  = vec![0usize; labels.len()];
    let mut cursor = 0usize;

    for group in label_groups(labels, &mut rng) {
        for idx in group {
            folds[idx] = cursor % num_folds;
            cursor    += 1;
        }
    }
    folds
}

/// `num_folds` train/validation splits; fold `f` is the validation set of split `f`.
pub fn stratified_k_fold(labels: &[usize], num_folds: usize, seed: u64) -> Vec<FoldSplit> {
    let assignment = stratified_fold_assignment(labels, num_folds, seed);
    let splits: Vec<FoldSplit> = (0..num_folds.max(1))
        .map(|f| {
            let (valid, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| assignment[i] == f);
            FoldSplit { train, valid }
        })
        .collect();

    tracing::debug!(
        "Stratified {}-fold split of {} examples: valid sizes {:?}",
        num_folds,
        labels.len(),
        splits.iter().map(|s| s.valid.len()).collect::<Vec<_>>(),
    );
    splits
}

/// Single stratified holdout: about `valid_fraction` of each label goes to validation.
pub fn stratified_holdout(labels: &[usize], valid_fraction: f64, seed: u64) -> FoldSplit {
    let fraction  = valid_fraction.clamp(0.0, 1.0);
    let mut rng   = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut valid = Vec::new();

    for group in label_groups(labels, &mut rng) {
        let n_valid = ((group.len() as f64) * fraction).round() as usize;
        let n_valid = n_valid.min(group.len());
        valid.extend_from_slice(&group[..n_valid]);
        train.extend_from_slice(&group[n_valid..]);
    }
    train.sort_unstable();
    valid.sort_unstable();

    tracing::debug!(
        "Stratified holdout: {} training, {} validation",
        train.len(),
        valid.len(),
    );
    FoldSplit { train, valid }
}

/// Degenerate split: train and evaluate on everything.
pub fn full_split(len: usize) -> FoldSplit {
    let all: Vec<usize> = (0..len).collect();
    FoldSplit { train: all.clone(), valid: all }
}
