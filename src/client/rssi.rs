//! RSSI sampling trial: poll the link's RSSI at a fixed interval. Not
//! every backend exposes RSSI, so "unavailable" is a result, not an error.

use crate::client::cancel::CancelToken;
use crate::client::error::{ClientError, ClientResult};
use crate::client::logs::{log_stem, write_raw_logs, RawLogs};
use crate::link::LinkHandle;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RssiConfig {
    pub samples: u32,
    pub interval: Duration,
    pub log_dir: Option<PathBuf>,
}

impl Default for RssiConfig {
    fn default() -> Self {
        Self {
            samples: 20,
            interval: Duration::from_millis(500),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RssiSample {
    pub index: u32,
    pub elapsed_s: f64,
    pub rssi_dbm: i16,
}

#[derive(Debug)]
pub struct RssiOutcome {
    /// Samples actually collected, which is zero when the link exposes
    /// no RSSI at all.
    pub samples: Vec<RssiSample>,
    pub rssi_available: bool,
    pub logs: Option<RawLogs>,
}

pub async fn run_rssi(
    link: &mut LinkHandle,
    config: &RssiConfig,
    cancel: &mut CancelToken,
) -> ClientResult<RssiOutcome> {
    let started = Instant::now();
    let mut samples = Vec::new();
    let mut rssi_available = true;

    for index in 1..=config.samples {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        match link.read_rssi() {
            Some(rssi_dbm) => samples.push(RssiSample {
                index,
                elapsed_s: started.elapsed().as_secs_f64(),
                rssi_dbm,
            }),
            None => {
                warn!("link reports no RSSI; ending trial early");
                rssi_available = false;
                break;
            }
        }
        if index < config.samples {
            tokio::select! {
                _ = time::sleep(config.interval) => {}
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            }
        }
    }

    info!(
        collected = samples.len(),
        rssi_available, "rssi trial done"
    );

    let logs = match &config.log_dir {
        Some(dir) => {
            let document = json!({
                "config": {
                    "samples": config.samples,
                    "interval_s": config.interval.as_secs_f64(),
                },
                "rssi_available": rssi_available,
                "samples_collected": samples.len(),
                "samples": samples,
            });
            Some(write_raw_logs(dir, &log_stem("rssi"), &document, &samples)?)
        }
        None => None,
    };

    Ok(RssiOutcome {
        samples,
        rssi_available,
        logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::FaultProfile;
    use crate::link::{Connector, LinkCaps, LinkEvent, LinkHandle};
    use crate::peripheral::{MockPeripheral, PeripheralConfig};
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_collects_requested_samples() {
        let dut = MockPeripheral::new(FaultProfile::typical(), PeripheralConfig::default());
        let mut link = dut.connect(Duration::from_secs(5)).await.unwrap();
        let config = RssiConfig {
            samples: 5,
            interval: Duration::from_millis(100),
            ..RssiConfig::default()
        };
        let mut cancel = CancelToken::disarmed();
        let outcome = run_rssi(&mut link, &config, &mut cancel).await.unwrap();
        assert_eq!(outcome.samples.len(), 5);
        assert!(outcome.rssi_available);
        // Synthesized values stay in the HCI range.
        assert!(outcome
            .samples
            .iter()
            .all(|s| (-127..=-1).contains(&s.rssi_dbm)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_rssi_ends_early() {
        let (cmd_tx, _cmd_rx) = mpsc::channel(4);
        let (_evt_tx, evt_rx) = mpsc::channel::<LinkEvent>(4);
        let mut link = LinkHandle::new(cmd_tx, evt_rx, LinkCaps::default());

        let config = RssiConfig {
            samples: 5,
            ..RssiConfig::default()
        };
        let mut cancel = CancelToken::disarmed();
        let outcome = run_rssi(&mut link, &config, &mut cancel).await.unwrap();
        assert!(outcome.samples.is_empty());
        assert!(!outcome.rssi_available);
    }
}
