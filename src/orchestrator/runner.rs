//! Matrix sweep: scenario x PHY x payload x repeat, with resume across
//! runs, per-trial manifest flushes, and an adapter lock for the whole
//! run.

use crate::client::{
    run_latency, run_rssi, run_throughput, CancelToken, ClientError, ConnectionManager,
    LatencyConfig, LatencyMode, RetryPolicy, ThroughputConfig,
};
use crate::fault::{FaultOverrides, FaultProfile};
use crate::link::{Connector, PhyMode, MAX_PAYLOAD_BYTES};
use crate::orchestrator::error::{SweepError, SweepResult};
use crate::orchestrator::lock::AdapterLock;
use crate::orchestrator::manifest::{ManifestArgs, ManifestOutputs, RunManifest};
use crate::orchestrator::table::{append_row, CompletedIndex};
use crate::orchestrator::types::{
    LatencyRow, RssiRow, ScenarioSummary, ThroughputRow, TrialKey,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time;
use tracing::{info, warn};

/// Pause between trials so the device releases the previous session.
const INTER_TRIAL_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub address: String,
    pub scenarios: Vec<String>,
    pub overrides: FaultOverrides,
    pub phys: Vec<PhyMode>,
    pub payloads: Vec<u16>,
    pub repeats: u32,
    /// Streaming window per throughput trial.
    pub duration: Duration,
    pub mtu: Option<u16>,
    pub retry: RetryPolicy,
    pub out_dir: PathBuf,
    /// Skip trials already present in the throughput table.
    pub resume: bool,
    pub note: String,
    /// 0 disables the latency pass.
    pub latency_iterations: u32,
    pub latency_mode: LatencyMode,
    /// 0 disables the RSSI pass.
    pub rssi_samples: u32,
    pub keep_raw_logs: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            address: "mock".to_string(),
            scenarios: vec!["best".to_string()],
            overrides: FaultOverrides::default(),
            phys: vec![PhyMode::Auto],
            payloads: vec![120],
            repeats: 1,
            duration: Duration::from_secs(5),
            mtu: None,
            retry: RetryPolicy::default(),
            out_dir: PathBuf::from("results"),
            resume: true,
            note: String::new(),
            latency_iterations: 0,
            latency_mode: LatencyMode::Start,
            rssi_samples: 0,
            keep_raw_logs: true,
        }
    }
}

#[derive(Debug)]
pub struct SweepReport {
    pub manifest_path: PathBuf,
    pub status: String,
    pub rows_written: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
    pub summaries: BTreeMap<String, ScenarioSummary>,
}

#[derive(Default, Clone)]
struct ScenarioAcc {
    kbps_sum: f64,
    packets: u64,
    loss: u64,
    trials: u32,
    retry_trials: u32,
    error_trials: u32,
}

impl ScenarioAcc {
    fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            avg_throughput_kbps: if self.trials > 0 {
                self.kbps_sum / self.trials as f64
            } else {
                0.0
            },
            total_packets: self.packets,
            total_loss: self.loss,
            total_trials: self.trials,
            retry_trials: self.retry_trials,
            error_trials: self.error_trials,
        }
    }
}

pub struct SweepRunner<C, F>
where
    C: Connector,
    F: Fn(&FaultProfile) -> C,
{
    config: SweepConfig,
    build_connector: F,
}

impl<C, F> SweepRunner<C, F>
where
    C: Connector,
    F: Fn(&FaultProfile) -> C,
{
    pub fn new(config: SweepConfig, build_connector: F) -> Self {
        Self {
            config,
            build_connector,
        }
    }

    pub async fn run(&self, cancel: &mut CancelToken) -> SweepResult<SweepReport> {
        let cfg = &self.config;
        std::fs::create_dir_all(&cfg.out_dir)?;
        let _lock = AdapterLock::acquire(&cfg.out_dir, &cfg.address)?;

        let outputs = ManifestOutputs {
            throughput_csv: cfg.out_dir.join("throughput.csv"),
            latency_csv: cfg.out_dir.join("latency.csv"),
            rssi_csv: cfg.out_dir.join("rssi.csv"),
            logs_dir: cfg.out_dir.join("logs"),
        };
        let completed = if cfg.resume {
            CompletedIndex::load(&outputs.throughput_csv)?
        } else {
            CompletedIndex::empty()
        };

        let mut manifest = RunManifest::begin(
            cfg.address.clone(),
            cfg.scenarios.clone(),
            cfg.phys.iter().map(|p| p.to_string()).collect(),
            cfg.payloads.clone(),
            cfg.repeats,
            outputs.clone(),
            ManifestArgs {
                mtu: cfg.mtu,
                connect_timeout_s: cfg.retry.timeout.as_secs_f64(),
                connect_attempts: cfg.retry.attempts,
                connect_retry_delay_s: cfg.retry.retry_delay.as_secs_f64(),
                note: cfg.note.clone(),
            },
        );
        let manifest_path = cfg.out_dir.join(manifest.file_name());
        manifest.write(&manifest_path)?;
        info!(run_id = %manifest.run_id, resumed_trials = completed.len(), "sweep started");

        let mut accs: BTreeMap<String, ScenarioAcc> = BTreeMap::new();
        let mut rows_written = 0u32;
        let mut skipped = 0u32;
        let mut aborted = false;

        'scenarios: for scenario in &cfg.scenarios {
            let profile = FaultProfile::preset(scenario)?.apply(&cfg.overrides)?;
            let connector = (self.build_connector)(&profile);

            for phy in &cfg.phys {
                let key = format!("{scenario}|{phy}");

                for &payload in &cfg.payloads {
                    for trial in 1..=cfg.repeats {
                        if cancel.is_cancelled() {
                            aborted = true;
                            break 'scenarios;
                        }
                        let trial_key = TrialKey {
                            scenario: scenario.clone(),
                            phy: phy.to_string(),
                            payload_bytes: payload,
                            trial,
                        };
                        if cfg.resume && completed.contains(&trial_key) {
                            info!(%key, payload, trial, "trial already recorded; skipping");
                            skipped += 1;
                            continue;
                        }

                        let acc = accs.entry(key.clone()).or_default();
                        match self
                            .throughput_trial(&connector, *phy, scenario, payload, trial, &outputs.logs_dir, cancel)
                            .await
                        {
                            Ok(row) => {
                                acc.kbps_sum += row.throughput_kbps;
                                acc.packets += row.packets;
                                acc.loss += row.estimated_lost_packets;
                                acc.trials += 1;
                                if row.connection_attempts_used > 1 {
                                    acc.retry_trials += 1;
                                }
                                append_row(&outputs.throughput_csv, &row)?;
                                rows_written += 1;
                            }
                            Err(SweepError::Client(ClientError::Cancelled)) => {
                                aborted = true;
                                break 'scenarios;
                            }
                            Err(err) => {
                                let message = format!(
                                    "{key} throughput payload={payload} trial={trial}: {err}"
                                );
                                warn!("{message}");
                                acc.error_trials += 1;
                                manifest.record_error(message);
                            }
                        }
                        manifest.update_summary(&key, accs[&key].summary());
                        manifest.write(&manifest_path)?;
                        time::sleep(INTER_TRIAL_SETTLE).await;
                    }
                }

                for trial in 1..=cfg.repeats {
                    if cfg.latency_iterations == 0 {
                        break;
                    }
                    if cancel.is_cancelled() {
                        aborted = true;
                        break 'scenarios;
                    }
                    match self
                        .latency_trial(&connector, *phy, scenario, trial, &outputs.logs_dir, cancel)
                        .await
                    {
                        Ok(row) => {
                            append_row(&outputs.latency_csv, &row)?;
                            rows_written += 1;
                        }
                        Err(SweepError::Client(ClientError::Cancelled)) => {
                            aborted = true;
                            break 'scenarios;
                        }
                        Err(err) => {
                            let message = format!("{key} latency trial={trial}: {err}");
                            warn!("{message}");
                            accs.entry(key.clone()).or_default().error_trials += 1;
                            manifest.record_error(message);
                            manifest.update_summary(&key, accs[&key].summary());
                        }
                    }
                    manifest.write(&manifest_path)?;
                    time::sleep(INTER_TRIAL_SETTLE).await;
                }

                for trial in 1..=cfg.repeats {
                    if cfg.rssi_samples == 0 {
                        break;
                    }
                    if cancel.is_cancelled() {
                        aborted = true;
                        break 'scenarios;
                    }
                    match self
                        .rssi_trial(&connector, *phy, scenario, trial, &outputs.logs_dir, cancel)
                        .await
                    {
                        Ok(row) => {
                            append_row(&outputs.rssi_csv, &row)?;
                            rows_written += 1;
                        }
                        Err(SweepError::Client(ClientError::Cancelled)) => {
                            aborted = true;
                            break 'scenarios;
                        }
                        Err(err) => {
                            let message = format!("{key} rssi trial={trial}: {err}");
                            warn!("{message}");
                            accs.entry(key.clone()).or_default().error_trials += 1;
                            manifest.record_error(message);
                            manifest.update_summary(&key, accs[&key].summary());
                        }
                    }
                    manifest.write(&manifest_path)?;
                    time::sleep(INTER_TRIAL_SETTLE).await;
                }
            }
        }

        manifest.finish(aborted);
        manifest.write(&manifest_path)?;
        info!(
            status = %manifest.status,
            rows_written,
            skipped,
            errors = manifest.errors.len(),
            "sweep finished"
        );

        Ok(SweepReport {
            manifest_path,
            status: manifest.status.clone(),
            rows_written,
            skipped,
            errors: manifest.errors.clone(),
            summaries: accs
                .iter()
                .map(|(k, acc)| (k.clone(), acc.summary()))
                .collect(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn throughput_trial(
        &self,
        connector: &C,
        phy: PhyMode,
        scenario: &str,
        payload: u16,
        trial: u32,
        logs_dir: &Path,
        cancel: &mut CancelToken,
    ) -> SweepResult<ThroughputRow> {
        let manager =
            ConnectionManager::new(connector, &self.config.address, self.config.retry.clone());
        let managed = manager.establish(self.config.mtu, phy, cancel).await?;
        let attempts_used = managed.attempts_used();

        let trial_config = ThroughputConfig {
            payload_bytes: payload.min(MAX_PAYLOAD_BYTES as u16) as u8,
            packet_count: 0,
            duration: self.config.duration,
            log_dir: self
                .config
                .keep_raw_logs
                .then(|| logs_dir.to_path_buf()),
            ..ThroughputConfig::default()
        };
        let mut link = managed.link;
        let outcome = run_throughput(&mut link, &trial_config, cancel).await?;
        drop(link);

        let (log_json, log_csv) = log_paths(&outcome.logs);
        Ok(ThroughputRow {
            scenario: scenario.to_string(),
            phy: phy.to_string(),
            payload_bytes: payload,
            trial,
            packets: outcome.summary.packets,
            estimated_lost_packets: outcome.summary.estimated_lost_packets,
            duration_s: outcome.summary.duration_s,
            throughput_kbps: outcome.summary.throughput_kbps,
            notification_rate_per_s: outcome.summary.notification_rate_per_s,
            connection_attempts_used: attempts_used,
            command_errors: outcome.command_errors,
            log_json,
            log_csv,
            notes: if outcome.link_lost {
                "link_lost".to_string()
            } else {
                String::new()
            },
        })
    }

    async fn latency_trial(
        &self,
        connector: &C,
        phy: PhyMode,
        scenario: &str,
        trial: u32,
        logs_dir: &Path,
        cancel: &mut CancelToken,
    ) -> SweepResult<LatencyRow> {
        let manager =
            ConnectionManager::new(connector, &self.config.address, self.config.retry.clone());
        let managed = manager.establish(self.config.mtu, phy, cancel).await?;
        let trial_config = LatencyConfig {
            mode: self.config.latency_mode,
            iterations: self.config.latency_iterations,
            log_dir: self
                .config
                .keep_raw_logs
                .then(|| logs_dir.to_path_buf()),
            ..LatencyConfig::default()
        };
        let mut link = managed.link;
        let outcome = run_latency(&mut link, &trial_config, cancel).await?;
        drop(link);

        let (log_json, log_csv) = log_paths(&outcome.logs);
        Ok(LatencyRow {
            scenario: scenario.to_string(),
            phy: phy.to_string(),
            trial,
            mode: outcome.summary.mode.to_string(),
            avg_latency_s: outcome.summary.avg_latency_s,
            min_latency_s: outcome.summary.min_latency_s,
            max_latency_s: outcome.summary.max_latency_s,
            samples: outcome.summary.samples,
            timeouts: outcome.summary.timeouts,
            log_json,
            log_csv,
            notes: if outcome.link_lost {
                "link_lost".to_string()
            } else {
                String::new()
            },
        })
    }

    async fn rssi_trial(
        &self,
        connector: &C,
        phy: PhyMode,
        scenario: &str,
        trial: u32,
        logs_dir: &Path,
        cancel: &mut CancelToken,
    ) -> SweepResult<RssiRow> {
        let manager =
            ConnectionManager::new(connector, &self.config.address, self.config.retry.clone());
        let managed = manager.establish(self.config.mtu, phy, cancel).await?;
        let trial_config = crate::client::RssiConfig {
            samples: self.config.rssi_samples,
            log_dir: self
                .config
                .keep_raw_logs
                .then(|| logs_dir.to_path_buf()),
            ..crate::client::RssiConfig::default()
        };
        let mut link = managed.link;
        let outcome = run_rssi(&mut link, &trial_config, cancel).await?;
        drop(link);

        let (log_json, log_csv) = log_paths(&outcome.logs);
        Ok(RssiRow {
            scenario: scenario.to_string(),
            phy: phy.to_string(),
            trial,
            samples_collected: outcome.samples.len() as u32,
            rssi_available: outcome.rssi_available,
            log_json,
            log_csv,
            notes: String::new(),
        })
    }
}

fn log_paths(logs: &Option<crate::client::RawLogs>) -> (String, String) {
    match logs {
        Some(raw) => (
            raw.json_path.display().to_string(),
            raw.csv_path.display().to_string(),
        ),
        None => (String::new(), String::new()),
    }
}
