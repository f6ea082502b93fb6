// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Seams where the pipeline talks to collaborators it does not
// own: where raw records come from, and where metric streams
// go. The application layer only sees these traits.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::record::RawRecord;

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Any component that can produce the full set of raw records.
///
/// Implementations:
///   - CsvRecordLoader → reads the KLUE RE csv layout
pub trait RecordSource {
    /// Load every record, or fail without returning any of them.
    fn load_all(&self) -> Result<Vec<RawRecord>>;
}

// ─── TrackingSink ─────────────────────────────────────────────────────────────
/// Receives `(run_name, step, metric_name, value)` scalar streams.
///
/// Implementations:
///   - CsvTrackingSink → appends rows to metrics.csv
///   - NullSink        → drops everything
pub trait TrackingSink: Send {
    fn record(&mut self, run_name: &str, step: usize, metric: &str, value: f64) -> Result<()>;
}
