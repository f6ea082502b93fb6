// ============================================================
// Layer 4 — Relation Batcher
// ============================================================
// Implements Burn's Batcher trait to stack ReSamples into
// tensors of shape [batch_size, seq_len].
//
// Samples encoded together already share one length, but a
// subset drawn from a different encode call may not, so each
// batch is padded again to its own longest sequence:
//
//   input_ids       pad with 0
//   attention_mask  pad with 0 (ignored positions)
//   token_type_ids  pad with 0
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::ReSample;

/// A batch of relation examples ready for the forward pass.
#[derive(Debug, Clone)]
pub struct ReBatch<B: Backend> {
    /// Token ids — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding — shape: [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Segment ids: 0 = query, 1 = sentence — shape: [batch_size, seq_len]
    pub token_type_ids: Tensor<B, 2, Int>,

    /// Gold relation ids — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,
}

#[derive(Clone, Debug)]
pub struct ReBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ReBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(&self, rows: Vec<Vec<i32>>, seq_len: usize) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let flat: Vec<i32> = rows
            .into_iter()
            .flat_map(|mut r| {
                r.resize(seq_len, 0);
                r
            })
            .collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape([batch_size, seq_len])
    }
}

fn to_i32(ids: &[u32]) -> Vec<i32> {
    ids.iter().map(|&x| x as i32).collect()
}

impl<B: Backend> Batcher<ReSample, ReBatch<B>> for ReBatcher<B> {
    fn batch(&self, items: Vec<ReSample>) -> ReBatch<B> {
        let seq_len = items
            .iter()
            .map(|s| s.features.seq_len())
            .max()
            .unwrap_or(0)
            .max(1);

        let ids   = items.iter().map(|s| to_i32(&s.features.input_ids)).collect();
        let mask  = items.iter().map(|s| to_i32(&s.features.attention_mask)).collect();
        let types = items.iter().map(|s| to_i32(&s.features.token_type_ids)).collect();
        let gold: Vec<i32> = items.iter().map(|s| s.label as i32).collect();

        ReBatch {
            input_ids:      self.stack(ids, seq_len),
            attention_mask: self.stack(mask, seq_len),
            token_type_ids: self.stack(types, seq_len),
            labels:         Tensor::<B, 1, Int>::from_ints(gold.as_slice(), &self.device),
        }
    }
}
