// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the raw csv to tensor batches:
//
//   train.csv
//       │
//       ▼
//   CsvRecordLoader     → rows + decoded entity spans
//       │
//       ▼
//   EntityMarker        → sentence rewritten with markers
//       │
//       ▼
//   TokenizationAdapter → (query, sentence) text pairs
//       │
//       ▼
//   Tokenizer           → token ids (Layer 6)
//       │
//       ▼
//   ReDataset           → labeled examples + label counts
//       │
//       ▼
//   stratified splitter → fold index lists
//       │
//       ▼
//   ReBatcher           → tensor batches for the DataLoader
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Decodes serialized entity span fields
pub mod span_parser;

/// Marker strategies that highlight subject/object spans
pub mod marker;

/// Reads the relation csv into RawRecords
pub mod loader;

/// Builds query/sentence pairs for the tokenizer
pub mod pairing;

/// Labeled examples with label-frequency accounting
pub mod dataset;

/// Implements Burn's Batcher trait for relation examples
pub mod batcher;

/// Stratified k-fold and holdout splits
pub mod splitter;
