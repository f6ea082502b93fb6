// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads `tokenizer.json` from the tokenizer directory (e.g. one
// exported from a pretrained Korean RoBERTa). When none exists,
// a word-level tokenizer is built from the corpus and saved, so
// the pipeline can run end to end without a download.
//
// Before encoding, the tokenizer is configured with the pair
// contract: pad to the batch's longest sequence, truncate to
// 256 tokens (longest-first), add special tokens. Marker tokens
// such as [SUBJ:PER] are registered as special tokens so they
// are never split.
//
// Reference: HuggingFace tokenizers crate documentation

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tokenizers::{
    AddedToken, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams, TruncationStrategy,
};

use crate::data::dataset::TokenizedFeatures;
use crate::data::pairing::TokenizerContract;

const SPECIAL_TOKENS: [&str; 5] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"];
const PAD_CANDIDATES: [&str; 2] = ["[PAD]", "<pad>"];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load the saved tokenizer, or build one over `texts` if there is none.
    pub fn load_or_build(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building word-level tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.path();
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        // ── Vocabulary by frequency, ties broken alphabetically ──────────────
        let mut freq: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for piece in pre_tokenize(text) {
                *freq.entry(piece.to_lowercase()).or_insert(0) += 1;
            }
        }
        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

        let mut vocab = serde_json::Map::new();
        for (id, tok) in SPECIAL_TOKENS.iter().enumerate() {
            vocab.insert(tok.to_string(), serde_json::json!(id));
        }
        for (word, _) in &words {
            if !vocab.contains_key(word) {
                let id = vocab.len();
                vocab.insert(word.clone(), serde_json::json!(id));
            }
        }

        let added: Vec<serde_json::Value> = SPECIAL_TOKENS
            .iter()
            .enumerate()
            .map(|(id, tok)| serde_json::json!({
                "id": id, "content": tok, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            }))
            .collect();

        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added,
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": null,
                "lowercase": true
            },
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": {
                "type": "BertProcessing",
                "sep": ["[SEP]", 3],
                "cls": ["[CLS]", 2]
            },
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "[UNK]"
            }
        });

        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::info!("Tokenizer built with {} entries, saved to '{}'", vocab.len(), path.display());

        self.load()
    }
}

/// Split like the `Whitespace` pre-tokenizer: runs of word chars, runs of other
/// non-space chars.
fn pre_tokenize(text: &str) -> Vec<String> {
    let mut out     = Vec::new();
    let mut current = String::new();
    let mut word    = false;

    for c in text.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            continue;
        }
        let is_word = c.is_alphanumeric() || c == '_';
        if !current.is_empty() && is_word != word {
            out.push(std::mem::take(&mut current));
        }
        word = is_word;
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Register marker tokens so they stay whole. Returns how many were new.
pub fn register_special_tokens(tokenizer: &mut Tokenizer, tokens: &[String]) -> usize {
    if tokens.is_empty() {
        return 0;
    }
    let added: Vec<AddedToken> = tokens.iter().map(|t| AddedToken::from(t.clone(), true)).collect();
    let n = tokenizer.add_special_tokens(&added);
    tracing::debug!("Registered {} marker tokens ({} new)", tokens.len(), n);
    n
}

/// Apply the pair contract's padding and truncation settings.
pub fn apply_contract(tokenizer: &mut Tokenizer, contract: &TokenizerContract) -> Result<()> {
    if contract.pad_to_longest {
        let (pad_token, pad_id) = PAD_CANDIDATES
            .iter()
            .find_map(|t| tokenizer.token_to_id(t).map(|id| (t.to_string(), id)))
            .unwrap_or_else(|| ("[PAD]".to_string(), 0));
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_id,
            pad_token,
            ..Default::default()
        }));
    } else {
        tokenizer.with_padding(None);
    }

    let truncation = contract.truncate.then(|| TruncationParams {
        max_length: contract.max_length,
        strategy:   TruncationStrategy::LongestFirst,
        ..Default::default()
    });
    tokenizer
        .with_truncation(truncation)
        .map_err(|e| anyhow::anyhow!("Invalid truncation settings: {e}"))?;
    Ok(())
}

/// Encode aligned (query, sentence) columns into feature rows.
pub fn encode_pairs(
    tokenizer: &Tokenizer,
    contract:  &TokenizerContract,
    queries:   &[String],
    sentences: &[String],
) -> Result<Vec<TokenizedFeatures>> {
    anyhow::ensure!(
        queries.len() == sentences.len(),
        "{} queries but {} sentences",
        queries.len(),
        sentences.len()
    );
    if queries.is_empty() {
        return Ok(Vec::new());
    }

    let inputs: Vec<(String, String)> = queries.iter().cloned().zip(sentences.iter().cloned()).collect();
    let encodings = tokenizer
        .encode_batch(inputs, contract.add_special_tokens)
        .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

    Ok(encodings
        .into_iter()
        .map(|enc| TokenizedFeatures {
            input_ids:      enc.get_ids().to_vec(),
            attention_mask: enc.get_attention_mask().to_vec(),
            token_type_ids: enc.get_type_ids().to_vec(),
        })
        .collect())
}

/// Rows needed in the embedding table: highest token id + 1.
pub fn embedding_rows(tokenizer: &Tokenizer) -> usize {
    tokenizer
        .get_vocab(true)
        .values()
        .max()
        .map_or(0, |&m| m as usize + 1)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "이 문장에서 [철수]은 [사람]인 [영희]의 [사람]이다.".to_string(),
            "@*사람*영희@는 #^사람^철수#의 친구이다.".to_string(),
        ]
    }

    #[test]
    fn test_pre_tokenize_splits_punctuation() {
        assert_eq!(pre_tokenize("[철수]은 a_b!"), vec!["[", "철수", "]", "은", "a_b", "!"]);
    }

    #[test]
    fn test_build_then_reload() {
        let dir   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let built = store.load_or_build(&corpus(), 100).unwrap();
        assert!(store.path().exists());
        let again = store.load_or_build(&[], 100).unwrap();
        assert_eq!(built.get_vocab_size(true), again.get_vocab_size(true));
        assert_eq!(built.token_to_id("[PAD]"), Some(0));
    }

    #[test]
    fn test_scenario_pair_within_limit() {
        let dir           = tempfile::tempdir().unwrap();
        let mut tokenizer = TokenizerStore::new(dir.path()).load_or_build(&corpus(), 100).unwrap();
        let contract      = TokenizerContract::default();
        apply_contract(&mut tokenizer, &contract).unwrap();

        let feats = encode_pairs(&tokenizer, &contract, &corpus()[..1], &corpus()[1..]).unwrap();
        assert_eq!(feats.len(), 1);
        assert!(feats[0].seq_len() <= 256);
        assert_eq!(feats[0].input_ids[0], 2); // [CLS]
        assert!(feats[0].token_type_ids.contains(&1));
    }

    #[test]
    fn test_long_pair_truncated_and_padded() {
        let dir           = tempfile::tempdir().unwrap();
        let mut tokenizer = TokenizerStore::new(dir.path()).load_or_build(&corpus(), 100).unwrap();
        let contract      = TokenizerContract::default();
        apply_contract(&mut tokenizer, &contract).unwrap();

        let long  = "영희 ".repeat(600);
        let feats = encode_pairs(
            &tokenizer,
            &contract,
            &[corpus()[0].clone(), corpus()[0].clone()],
            &[long, "철수".to_string()],
        )
        .unwrap();
        assert_eq!(feats[0].seq_len(), 256);
        assert_eq!(feats[1].seq_len(), 256);
        assert_eq!(*feats[1].attention_mask.last().unwrap(), 0);
    }

    #[test]
    fn test_marker_tokens_stay_whole() {
        let dir           = tempfile::tempdir().unwrap();
        let mut tokenizer = TokenizerStore::new(dir.path()).load_or_build(&corpus(), 100).unwrap();
        let before        = embedding_rows(&tokenizer);
        let added         = register_special_tokens(&mut tokenizer, &["[SUBJ]".to_string(), "[/SUBJ]".to_string()]);
        assert_eq!(added, 2);
        assert_eq!(embedding_rows(&tokenizer), before + 2);

        let enc = tokenizer.encode("[SUBJ]영희[/SUBJ]", false).unwrap();
        assert_eq!(enc.get_tokens()[0], "[SUBJ]");
    }

    #[test]
    fn test_mismatched_columns() {
        let dir       = tempfile::tempdir().unwrap();
        let tokenizer = TokenizerStore::new(dir.path()).load_or_build(&corpus(), 100).unwrap();
        let contract  = TokenizerContract::default();
        assert!(encode_pairs(&tokenizer, &contract, &corpus(), &[]).is_err());
    }
}
