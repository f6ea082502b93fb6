// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence shared by training and prediction:
//
//   checkpoint.rs      — fold artifact directories: weights via
//                        Burn's CompactRecorder, model and
//                        training config as JSON, fold report.
//
//   tokenizer_store.rs — tokenizer.json persistence, marker
//                        token registration and the pair
//                        padding/truncation contract.
//
//   tracking.rs        — scalar metric streams appended to
//                        metrics.csv behind a tracker that never
//                        fails training.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Fold artifact saving and loading
pub mod checkpoint;

/// Tokenizer loading, building, and pair encoding
pub mod tokenizer_store;

/// Metric stream sinks
pub mod tracking;
