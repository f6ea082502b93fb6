// ============================================================
// Layer 4 — Record Loader
// ============================================================
// Reads the KLUE RE csv layout with the `csv` crate:
//
//   id,sentence,subject_entity,object_entity,label[,source]
//
// Each row's two entity columns are decoded with the span
// parser. Any bad row aborts the whole load: the columns are
// consumed in parallel downstream (sentences, words, types,
// labels), so a partially loaded table would misalign them.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::data::marker::EntityMarker;
use crate::data::span_parser::SpanDescriptorParser;
use crate::domain::error::ReError;
use crate::domain::record::{PreparedRecord, RawRecord};
use crate::domain::traits::RecordSource;

/// One csv row before the entity columns are decoded.
/// Columns not named here (e.g. `source`) are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    id:             String,
    sentence:       String,
    subject_entity: String,
    object_entity:  String,
    label:          String,
}

/// Loads every row of one csv file.
pub struct CsvRecordLoader {
    path: PathBuf,
}

impl CsvRecordLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for CsvRecordLoader {
    fn load_all(&self) -> Result<Vec<RawRecord>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("Cannot open '{}'", self.path.display()))?;
        let records = read_records(file)
            .with_context(|| format!("Failed to load '{}'", self.path.display()))?;
        tracing::info!("Loaded {} records from '{}'", records.len(), self.path.display());
        Ok(records)
    }
}

/// Decode all rows from any csv reader. Fails on the first bad row.
pub fn read_records<R: Read>(input: R) -> Result<Vec<RawRecord>> {
    let parser     = SpanDescriptorParser::new();
    let mut reader = csv::Reader::from_reader(input);
    let mut seen   = HashSet::new();
    let mut out    = Vec::new();

    for (row_no, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.with_context(|| format!("Bad csv row {}", row_no + 1))?;

        let subject = parser
            .parse(&row.subject_entity)
            .with_context(|| format!("Record {}: subject_entity", row.id))?;
        let object = parser
            .parse(&row.object_entity)
            .with_context(|| format!("Record {}: object_entity", row.id))?;

        if !seen.insert(row.id.clone()) {
            bail!("Duplicate record id '{}'", row.id);
        }

        for span in [&subject, &object] {
            if span.slice(&row.sentence) != Some(span.word.as_str()) {
                tracing::debug!(
                    "Record {}: word '{}' differs from sentence[{}..{}]",
                    row.id, span.word, span.start, span.end
                );
            }
        }

        out.push(RawRecord {
            id:       row.id,
            sentence: row.sentence,
            subject,
            object,
            label:    row.label,
        });
    }

    Ok(out)
}

/// Apply one marker to every record; the first failure aborts.
pub fn prepare_all(records: &[RawRecord], marker: &EntityMarker) -> Result<Vec<PreparedRecord>, ReError> {
    tracing::info!("Marking {} records with strategy '{}'", records.len(), marker.strategy());
    records.iter().map(|r| marker.prepare(r)).collect()
}
