//! Per-trial raw logs: a JSON document with config and summary, plus a
//! flat CSV of the per-sample rows for spreadsheet work.

use crate::client::error::ClientResult;
use chrono::Local;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct RawLogs {
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

/// Timestamp prefix shared by the JSON/CSV pair of one trial.
pub fn log_stem(kind: &str) -> String {
    format!("{}_ble_{kind}", Local::now().format("%Y%m%d_%H%M%S%3f"))
}

pub fn write_raw_logs<R: Serialize>(
    dir: &Path,
    stem: &str,
    document: &impl Serialize,
    rows: &[R],
) -> ClientResult<RawLogs> {
    fs::create_dir_all(dir)?;
    let json_path = dir.join(format!("{stem}.json"));
    fs::write(&json_path, serde_json::to_vec_pretty(document)?)?;

    let csv_path = dir.join(format!("{stem}.csv"));
    let mut writer = csv::Writer::from_path(&csv_path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(RawLogs { json_path, csv_path })
}
