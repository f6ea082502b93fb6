// ============================================================
// Layer 4 — Tokenization Adapter
// ============================================================
// Builds the (query, sentence) text pairs fed to the tokenizer.
// The query restates the relation question in Korean using the
// entity words and their readable types:
//
//   이 문장에서 [철수]은 [사람]인 [영희]의 [사람]이다.
//              object   subj-type subject  obj-type
//
// The second text is the marker-rewritten sentence. No
// tokenization happens here; `TokenizerContract` declares the
// settings the tokenizer must be configured with.

use serde::{Deserialize, Serialize};

use crate::domain::record::PreparedRecord;

pub const MAX_PAIR_TOKENS: usize = 256;

/// Settings the external tokenizer must apply to every pair batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerContract {
    /// Maximum combined length of query + sentence, special tokens included
    pub max_length: usize,
    /// Pad every sequence to the longest one in the batch
    pub pad_to_longest: bool,
    pub truncate: bool,
    pub add_special_tokens: bool,
}

impl Default for TokenizerContract {
    fn default() -> Self {
        Self {
            max_length:         MAX_PAIR_TOKENS,
            pad_to_longest:     true,
            truncate:           true,
            add_special_tokens: true,
        }
    }
}

/// Fixed Korean query template for one record.
pub fn query_text(record: &PreparedRecord) -> String {
    format!(
        "이 문장에서 [{}]은 [{}]인 [{}]의 [{}]이다.",
        record.object_word,
        record.subject_type.korean(),
        record.subject_word,
        record.object_type.korean(),
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenizationAdapter {
    contract: TokenizerContract,
}

impl TokenizationAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract(&self) -> TokenizerContract {
        self.contract
    }

    /// Parallel (query_texts, sentences) columns, one entry per record.
    pub fn build_pairs(&self, records: &[PreparedRecord]) -> (Vec<String>, Vec<String>) {
        records
            .iter()
            .map(|r| (query_text(r), r.marked_sentence.clone()))
            .unzip()
    }
}
