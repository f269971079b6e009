//! Aggregate CSV row shapes. Field order is the column order; these
//! tables are append-only across runs, so the shapes must stay stable.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputRow {
    pub scenario: String,
    pub phy: String,
    pub payload_bytes: u16,
    pub trial: u32,
    pub packets: u64,
    pub estimated_lost_packets: u64,
    pub duration_s: f64,
    pub throughput_kbps: f64,
    pub notification_rate_per_s: f64,
    pub connection_attempts_used: u32,
    pub command_errors: u32,
    pub log_json: String,
    pub log_csv: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyRow {
    pub scenario: String,
    pub phy: String,
    pub trial: u32,
    pub mode: String,
    pub avg_latency_s: Option<f64>,
    pub min_latency_s: Option<f64>,
    pub max_latency_s: Option<f64>,
    pub samples: u32,
    pub timeouts: u32,
    pub log_json: String,
    pub log_csv: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssiRow {
    pub scenario: String,
    pub phy: String,
    pub trial: u32,
    pub samples_collected: u32,
    pub rssi_available: bool,
    pub log_json: String,
    pub log_csv: String,
    pub notes: String,
}

/// Identity of one throughput trial within the sweep matrix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrialKey {
    pub scenario: String,
    pub phy: String,
    pub payload_bytes: u16,
    pub trial: u32,
}

/// Per `scenario|phy` aggregate carried in the manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub avg_throughput_kbps: f64,
    pub total_packets: u64,
    pub total_loss: u64,
    pub total_trials: u32,
    pub retry_trials: u32,
    pub error_trials: u32,
}
