// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Each use case drives the lower layers through one command:
//
//   prepare  → load csv, mark spans, write the marked table
//   train    → load, mark, tokenize, k-fold train, save folds
//   predict  → load folds, tokenize, hard-vote, write labels
//
// Rules for this layer:
//   - No model math here (Layer 5)
//   - No argument parsing here (Layer 1)
//   - Only workflow coordination

pub mod prepare_use_case;
pub mod train_use_case;
pub mod predict_use_case;
