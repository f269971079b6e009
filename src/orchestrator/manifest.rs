//! Run manifest: one JSON document per run, rewritten after every trial
//! so a crash still leaves an accurate record on disk.

use crate::orchestrator::error::SweepResult;
use crate::orchestrator::types::ScenarioSummary;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_COMPLETED_WITH_ERRORS: &str = "completed_with_errors";
pub const STATUS_ABORTED: &str = "aborted";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestOutputs {
    pub throughput_csv: PathBuf,
    pub latency_csv: PathBuf,
    pub rssi_csv: PathBuf,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestArgs {
    pub mtu: Option<u16>,
    pub connect_timeout_s: f64,
    pub connect_attempts: u32,
    pub connect_retry_delay_s: f64,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    pub scenarios: Vec<String>,
    pub phys: Vec<String>,
    pub payloads: Vec<u16>,
    pub repeats: u32,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub status: String,
    pub errors: Vec<String>,
    pub outputs: ManifestOutputs,
    /// Keyed `scenario|phy`.
    pub summary: BTreeMap<String, ScenarioSummary>,
    pub args: ManifestArgs,
}

impl RunManifest {
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        address: String,
        scenarios: Vec<String>,
        phys: Vec<String>,
        payloads: Vec<u16>,
        repeats: u32,
        outputs: ManifestOutputs,
        args: ManifestArgs,
    ) -> Self {
        let now = Local::now();
        Self {
            run_id: now.format("%Y%m%d_%H%M%S").to_string(),
            kind: "matrix_sweep".to_string(),
            address,
            scenarios,
            phys,
            payloads,
            repeats,
            started_at: now.to_rfc3339(),
            ended_at: None,
            status: STATUS_RUNNING.to_string(),
            errors: Vec::new(),
            outputs,
            summary: BTreeMap::new(),
            args,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_manifest.json", self.run_id)
    }

    pub fn record_error(&mut self, message: String) {
        self.errors.push(message);
    }

    pub fn update_summary(&mut self, key: &str, summary: ScenarioSummary) {
        self.summary.insert(key.to_string(), summary);
    }

    pub fn finish(&mut self, aborted: bool) {
        self.ended_at = Some(Local::now().to_rfc3339());
        self.status = if aborted {
            STATUS_ABORTED
        } else if self.errors.is_empty() {
            STATUS_COMPLETED
        } else {
            STATUS_COMPLETED_WITH_ERRORS
        }
        .to_string();
    }

    /// Serialize the whole document and replace the file on disk.
    pub fn write(&self, path: &Path) -> SweepResult<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
