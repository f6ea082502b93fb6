// ============================================================
// Layer 6 — Experiment Tracking
// ============================================================
// Scalar streams from the trainer, one row per observation:
//
//   run,step,metric,value
//   ldam_ep4_1,10,train/loss,3.184021
//   ldam_ep4_1,10,train/lr,0.000000667
//   ldam_ep4_1,500,eval/micro_f1,0.612500
//
// The file is appended to across runs, so one metrics.csv can
// hold every fold of every run and be plotted afterwards. Rows
// are buffered and reach the disk at each eval/* row and when
// the sink is dropped.
//
// Sinks may fail (disk full, file removed). The Tracker wraps a
// sink and keeps training alive: the first failure is logged as
// a warning, later ones only at debug.
//
// Reference: csv crate documentation (Writer)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use crate::domain::traits::TrackingSink;

// ─── CsvTrackingSink ──────────────────────────────────────────────────────────
pub struct CsvTrackingSink {
    csv_path: PathBuf,
    writer:   csv::Writer<fs::File>,
}

impl CsvTrackingSink {
    /// Open `dir/metrics.csv` for appending, writing the header if the file is new.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create tracking dir '{}'", dir.display()))?;
        let csv_path = dir.join("metrics.csv");
        let is_new   = !csv_path.exists();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open '{}'", csv_path.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(["run", "step", "metric", "value"])?;
            writer.flush()?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path, writer })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl TrackingSink for CsvTrackingSink {
    fn record(&mut self, run_name: &str, step: usize, metric: &str, value: f64) -> Result<()> {
        self.writer.write_record([
            run_name,
            &step.to_string(),
            metric,
            &format!("{value:.9}"),
        ])?;
        if metric.starts_with("eval/") {
            self.writer.flush()?;
        }
        Ok(())
    }
}

// ─── NullSink ─────────────────────────────────────────────────────────────────
pub struct NullSink;

impl TrackingSink for NullSink {
    fn record(&mut self, _run_name: &str, _step: usize, _metric: &str, _value: f64) -> Result<()> {
        Ok(())
    }
}

// ─── Tracker ──────────────────────────────────────────────────────────────────
/// Error-swallowing front for a TrackingSink.
pub struct Tracker {
    sink:     Box<dyn TrackingSink>,
    failures: usize,
}

impl Tracker {
    pub fn new(sink: Box<dyn TrackingSink>) -> Self {
        Self { sink, failures: 0 }
    }

    pub fn disabled() -> Self {
        Self::new(Box::new(NullSink))
    }

    pub fn log(&mut self, run_name: &str, step: usize, metric: &str, value: f64) {
        if let Err(e) = self.sink.record(run_name, step, metric, value) {
            self.failures += 1;
            if self.failures == 1 {
                tracing::warn!("Tracking sink failed, continuing without it: {:#}", e);
            } else {
                tracing::debug!("Tracking sink failed again ({}): {:#}", self.failures, e);
            }
        }
    }

    /// Number of observations the sink rejected.
    pub fn failures(&self) -> usize {
        self.failures
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl TrackingSink for FailingSink {
        fn record(&mut self, _: &str, _: usize, _: &str, _: f64) -> Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    #[test]
    fn test_csv_rows_appended() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = CsvTrackingSink::new(dir.path()).unwrap();
            sink.record("run_1", 10, "train/loss", 0.5).unwrap();
        }
        {
            let mut sink = CsvTrackingSink::new(dir.path()).unwrap();
            sink.record("run_1", 20, "eval/micro_f1", 0.25).unwrap();
        }

        let text  = fs::read_to_string(dir.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "run,step,metric,value");
        assert!(lines[1].starts_with("run_1,10,train/loss,0.5"));
        assert!(lines[2].starts_with("run_1,20,eval/micro_f1,0.25"));
    }

    #[test]
    fn test_train_rows_buffered_until_eval() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let mut sink = CsvTrackingSink::new(dir.path()).unwrap();

        sink.record("run_1", 100, "train/loss", 0.5).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 1);

        sink.record("run_1", 500, "eval/accuracy", 0.75).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(2).unwrap().starts_with("run_1,500,eval/accuracy,0.75"));

        sink.record("run_1", 600, "train/loss", 0.4).unwrap();
        drop(sink);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 4);
    }

    #[test]
    fn test_tracker_swallows_errors() {
        let mut tracker = Tracker::new(Box::new(FailingSink));
        tracker.log("r", 1, "train/loss", 1.0);
        tracker.log("r", 2, "train/loss", 1.0);
        assert_eq!(tracker.failures(), 2);
    }

    #[test]
    fn test_null_sink() {
        let mut tracker = Tracker::disabled();
        tracker.log("r", 1, "train/lr", 1e-5);
        assert_eq!(tracker.failures(), 0);
    }
}
