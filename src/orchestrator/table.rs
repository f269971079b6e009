//! Append-only CSV tables plus the completed-trial index used for
//! resume. The index is loaded once per run; membership checks are then
//! O(1) per trial.

use crate::orchestrator::error::SweepResult;
use crate::orchestrator::types::TrialKey;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, warn};

/// Append one row, writing the header only when the file is new.
pub fn append_row<T: Serialize>(path: &Path, row: &T) -> SweepResult<()> {
    let fresh = !path.exists() || path.metadata().map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(fresh)
        .from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(())
}

/// Trials already present in the throughput table from earlier runs.
#[derive(Debug, Default)]
pub struct CompletedIndex {
    keys: HashSet<TrialKey>,
}

impl CompletedIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse tolerantly: rows from older or hand-edited files that are
    /// missing the key columns are skipped, not fatal.
    pub fn load(path: &Path) -> SweepResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers = reader.headers()?.clone();
        let col = |name: &str| headers.iter().position(|h| h == name);
        let (Some(scenario), Some(phy), Some(payload), Some(trial)) = (
            col("scenario"),
            col("phy"),
            col("payload_bytes"),
            col("trial"),
        ) else {
            warn!(path = %path.display(), "throughput table missing key columns; resume index empty");
            return Ok(Self::default());
        };

        let mut keys = HashSet::new();
        for record in reader.records() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or("");
            let (Ok(payload_bytes), Ok(trial_no)) =
                (field(payload).parse::<u16>(), field(trial).parse::<u32>())
            else {
                continue;
            };
            keys.insert(TrialKey {
                scenario: field(scenario).to_string(),
                phy: field(phy).to_string(),
                payload_bytes,
                trial: trial_no,
            });
        }
        debug!(completed = keys.len(), "resume index loaded");
        Ok(Self { keys })
    }

    pub fn contains(&self, key: &TrialKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::ThroughputRow;

    fn row(scenario: &str, payload: u16, trial: u32) -> ThroughputRow {
        ThroughputRow {
            scenario: scenario.to_string(),
            phy: "auto".to_string(),
            payload_bytes: payload,
            trial,
            packets: 100,
            estimated_lost_packets: 2,
            duration_s: 5.0,
            throughput_kbps: 3.84,
            notification_rate_per_s: 20.0,
            connection_attempts_used: 1,
            command_errors: 0,
            log_json: String::new(),
            log_csv: String::new(),
            notes: String::new(),
        }
    }

    #[test]
    fn test_header_written_once_across_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throughput.csv");
        append_row(&path, &row("best", 20, 1)).unwrap();
        append_row(&path, &row("best", 20, 2)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let headers: Vec<&str> = text
            .lines()
            .filter(|l| l.starts_with("scenario,"))
            .collect();
        assert_eq!(headers.len(), 1);
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().ends_with("log_json,log_csv,notes"));
    }

    #[test]
    fn test_index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throughput.csv");
        append_row(&path, &row("best", 20, 1)).unwrap();
        append_row(&path, &row("worst", 120, 3)).unwrap();

        let index = CompletedIndex::load(&path).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains(&TrialKey {
            scenario: "best".into(),
            phy: "auto".into(),
            payload_bytes: 20,
            trial: 1,
        }));
        assert!(!index.contains(&TrialKey {
            scenario: "best".into(),
            phy: "auto".into(),
            payload_bytes: 20,
            trial: 2,
        }));
    }

    #[test]
    fn test_missing_file_is_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = CompletedIndex::load(&dir.path().join("nope.csv")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_garbage_rows_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("throughput.csv");
        std::fs::write(
            &path,
            "scenario,phy,payload_bytes,trial\nbest,auto,20,1\nbest,auto,not_a_number,2\n",
        )
        .unwrap();
        let index = CompletedIndex::load(&path).unwrap();
        assert_eq!(index.len(), 1);
    }
}
