// ============================================================
// Layer 5 — Relation Classifier
// ============================================================
// Transformer encoder over a (query, marked sentence) pair with
// a sequence-classification head:
//
//   input_ids      ─▶ token embedding    ┐
//   position 0..S  ─▶ position embedding ├─▶ sum ─▶ N × EncoderBlock ─▶ LayerNorm
//   token_type_ids ─▶ segment embedding  ┘                                 │
//                                                    [CLS] vector (pos 0) ◀┘
//                                                               │
//                                                   Linear ─▶ 30 logits
//
// attention_mask == 0 marks padding; those keys are masked out
// of self-attention so padded batches score the same as
// unpadded ones.
//
// Reference: Vaswani et al. (2017), Devlin et al. (2019) BERT

use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

use crate::domain::label::NUM_LABELS;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ReClassifierConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    #[config(default = 0.1)]
    pub dropout:     f64,
    #[config(default = 2)]
    pub type_vocab_size: usize,
    #[config(default = "NUM_LABELS")]
    pub num_labels:  usize,
}

impl ReClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ReClassifier<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let segment_embedding  = EmbeddingConfig::new(self.type_vocab_size, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let classifier = LinearConfig::new(self.d_model, self.num_labels).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        ReClassifier {
            token_embedding, position_embedding, segment_embedding, layers,
            final_norm, classifier, dropout,
            max_seq_len: self.max_seq_len,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// `pad_mask`: true where the position is padding — shape [batch, seq_len]
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let input       = MhaInput::self_attn(x.clone()).mask_pad(pad_mask);
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct ReClassifier<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub segment_embedding:  Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub classifier:         Linear<B>,
    pub dropout:            Dropout,
    pub max_seq_len:        usize,
}

impl<B: Backend> ReClassifier<B> {
    /// [batch, seq_len] ids, mask and segments → [batch, num_labels] logits
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let [batch_size, seq_len] = input_ids.dims();

        let tok_emb = self.token_embedding.forward(input_ids);
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);
        let seg_emb = self.segment_embedding.forward(token_type_ids);

        let pad_mask = attention_mask.equal_elem(0);
        let mut x = self.dropout.forward(tok_emb + pos_emb + seg_emb);
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        let x = self.final_norm.forward(x); // [batch, seq_len, d_model]
        let [_, _, d_model] = x.dims();

        let cls = x
            .slice([0..batch_size, 0..1, 0..d_model])
            .reshape([batch_size, d_model]);
        self.classifier.forward(self.dropout.forward(cls))
    }

    /// Arg-max relation id per example — shape [batch]
    pub fn predict(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        token_type_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 1, Int> {
        let logits = self.forward(input_ids, attention_mask, token_type_ids);
        // argmax(1) returns [batch, 1]
        logits.argmax(1).flatten::<1>(0, 1)
    }

    pub fn num_labels(&self) -> usize {
        self.classifier.weight.dims()[1]
    }
}

/// Read a 1-D id tensor back to host label ids.
pub fn ids_from_tensor<B: Backend>(ids: Tensor<B, 1, Int>) -> anyhow::Result<Vec<usize>> {
    let values: Vec<i64> = ids
        .into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))?;
    Ok(values.into_iter().map(|v| v.max(0) as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    fn ids(rows: &[&[i32]]) -> Tensor<NdArray, 2, Int> {
        let len  = rows[0].len();
        let flat: Vec<i32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::<NdArray, 1, Int>::from_ints(flat.as_slice(), &Default::default()).reshape([rows.len(), len])
    }

    #[test]
    fn test_logits_shape() {
        let model: ReClassifier<NdArray> = ReClassifierConfig::new(20, 16, 8, 2, 1, 16)
            .with_dropout(0.0)
            .init(&Default::default());
        let logits = model.forward(
            ids(&[&[2, 5, 3, 7, 3], &[2, 6, 3, 0, 0]]),
            ids(&[&[1, 1, 1, 1, 1], &[1, 1, 1, 0, 0]]),
            ids(&[&[0, 0, 0, 1, 1], &[0, 0, 0, 0, 0]]),
        );
        assert_eq!(logits.dims(), [2, NUM_LABELS]);
        assert_eq!(model.num_labels(), NUM_LABELS);
    }

    #[test]
    fn test_predict_returns_one_id_per_row() {
        let model: ReClassifier<NdArray> = ReClassifierConfig::new(20, 16, 8, 2, 1, 16)
            .with_dropout(0.0)
            .init(&Default::default());
        let pred = model.predict(
            ids(&[&[2, 5, 3], &[2, 6, 3]]),
            ids(&[&[1, 1, 1], &[1, 1, 1]]),
            ids(&[&[0, 0, 1], &[0, 0, 1]]),
        );
        let labels = ids_from_tensor(pred).unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().all(|&l| l < NUM_LABELS));
    }

    #[test]
    fn test_padding_does_not_change_logits() {
        let model: ReClassifier<NdArray> = ReClassifierConfig::new(20, 16, 8, 2, 1, 16)
            .with_dropout(0.0)
            .init(&Default::default());

        let short = model.forward(ids(&[&[2, 5, 3]]), ids(&[&[1, 1, 1]]), ids(&[&[0, 0, 0]]));
        let padded = model.forward(ids(&[&[2, 5, 3, 0, 0]]), ids(&[&[1, 1, 1, 0, 0]]), ids(&[&[0, 0, 0, 0, 0]]));

        let a: Vec<f32> = short.into_data().to_vec().unwrap();
        let b: Vec<f32> = padded.into_data().to_vec().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-4, "{x} vs {y}");
        }
    }
}
