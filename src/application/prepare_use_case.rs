// ============================================================
// Layer 2 — PrepareUseCase
// ============================================================
// Marks every record with one strategy and writes the result
// as a csv table for inspection:
//
//   id,sentence,subject_entity,object_entity,subject_entity_type,object_entity_type,label
//   0,@*사람*영희@는 #^사람^철수#의 친구이다.,영희,철수,PER,PER,per:colleagues

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::data::{
    loader::{prepare_all, CsvRecordLoader},
    marker::{EntityMarker, MarkerStrategy},
};
use crate::domain::traits::RecordSource;

pub struct PrepareUseCase {
    data_path: PathBuf,
    out_path:  PathBuf,
    strategy:  MarkerStrategy,
}

impl PrepareUseCase {
    pub fn new(data_path: impl Into<PathBuf>, out_path: impl Into<PathBuf>, strategy: MarkerStrategy) -> Self {
        Self { data_path: data_path.into(), out_path: out_path.into(), strategy }
    }

    /// Returns the number of rows written.
    pub fn execute(&self) -> Result<usize> {
        let records  = CsvRecordLoader::new(&self.data_path).load_all()?;
        let prepared = prepare_all(&records, &EntityMarker::new(self.strategy))?;

        if let Some(parent) = self.out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create '{}'", parent.display()))?;
        }
        let mut writer = csv::Writer::from_path(&self.out_path)
            .with_context(|| format!("Cannot write '{}'", self.out_path.display()))?;
        for record in &prepared {
            writer.serialize(record)?;
        }
        writer.flush()?;

        tracing::info!("Wrote {} prepared rows to '{}'", prepared.len(), self.out_path.display());
        Ok(prepared.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "id,sentence,subject_entity,object_entity,label,source\n\
        0,영희는 철수의 친구이다.,\"{'word': '영희', 'start_idx': 0, 'end_idx': 2, 'type': 'PER'}\",\"{'word': '철수', 'start_idx': 4, 'end_idx': 6, 'type': 'PER'}\",per:colleagues,wikipedia\n";

    #[test]
    fn test_writes_marked_table() {
        let dir  = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.csv");
        let out  = dir.path().join("prepared").join("train_marked.csv");
        std::fs::write(&data, CSV).unwrap();

        let n = PrepareUseCase::new(&data, &out, MarkerStrategy::Default).execute().unwrap();
        assert_eq!(n, 1);

        let text  = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "id,sentence,subject_entity,object_entity,subject_entity_type,object_entity_type,label"
        );
        assert_eq!(lines[1], "0,@*사람*영희@는 #^사람^철수#의 친구이다.,영희,철수,PER,PER,per:colleagues");
    }

    #[test]
    fn test_malformed_row_writes_nothing() {
        let dir  = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.csv");
        let out  = dir.path().join("out.csv");
        std::fs::write(&data, CSV.replace("'type': 'PER'}\",per", "'kind': 'PER'}\",per")).unwrap();

        assert!(PrepareUseCase::new(&data, &out, MarkerStrategy::Token).execute().is_err());
        assert!(!out.exists());
    }
}
