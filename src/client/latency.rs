//! Command-to-notification latency trial: request one packet at a time
//! and time how long the first notification takes to arrive.

use crate::client::cancel::CancelToken;
use crate::client::error::{ClientError, ClientResult};
use crate::client::logs::{log_stem, write_raw_logs, RawLogs};
use crate::link::{Command, LinkEvent, LinkHandle};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyMode {
    /// Reset before every iteration, so each sample includes the full
    /// re-arm path.
    Start,
    /// Reset once, then fire single-packet runs back to back.
    Trigger,
}

impl LatencyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyMode::Start => "start",
            LatencyMode::Trigger => "trigger",
        }
    }
}

impl fmt::Display for LatencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LatencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(LatencyMode::Start),
            "trigger" => Ok(LatencyMode::Trigger),
            other => Err(format!("unknown latency mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LatencyConfig {
    pub mode: LatencyMode,
    pub iterations: u32,
    /// Requested payload; 0 keeps the device default.
    pub payload_bytes: u8,
    /// Per-iteration wait for the notification.
    pub timeout: Duration,
    /// Gap between iterations.
    pub spacing: Duration,
    pub log_dir: Option<PathBuf>,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            mode: LatencyMode::Start,
            iterations: 20,
            payload_bytes: 0,
            timeout: Duration::from_secs(2),
            spacing: Duration::from_millis(50),
            log_dir: None,
        }
    }
}

/// One iteration. Timed-out iterations log the timeout value as their
/// latency but are excluded from the summary statistics.
#[derive(Debug, Clone, Serialize)]
pub struct LatencySample {
    pub iteration: u32,
    pub mode: LatencyMode,
    pub latency_s: f64,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencySummary {
    pub mode: LatencyMode,
    pub samples: u32,
    pub timeouts: u32,
    pub avg_latency_s: Option<f64>,
    pub min_latency_s: Option<f64>,
    pub max_latency_s: Option<f64>,
}

#[derive(Debug)]
pub struct LatencyOutcome {
    pub summary: LatencySummary,
    pub samples: Vec<LatencySample>,
    /// Non-fatal command write failures (a Stop after link loss, say).
    pub command_errors: u32,
    pub link_lost: bool,
    pub logs: Option<RawLogs>,
}

pub async fn run_latency(
    link: &mut LinkHandle,
    config: &LatencyConfig,
    cancel: &mut CancelToken,
) -> ClientResult<LatencyOutcome> {
    if config.mode == LatencyMode::Trigger {
        link.send(&Command::Reset).await?;
    }

    let mut samples = Vec::with_capacity(config.iterations as usize);
    let mut command_errors = 0u32;
    let mut link_lost = false;
    for iteration in 1..=config.iterations {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        if config.mode == LatencyMode::Start {
            link.send(&Command::Reset).await?;
        }
        link.drain_events();

        let sent = Instant::now();
        link.send(&Command::Start {
            payload_bytes: config.payload_bytes,
            packet_count: 1,
        })
        .await?;

        let sample = match wait_for_notification(link, config.timeout).await {
            Waited::Arrived(latency) => LatencySample {
                iteration,
                mode: config.mode,
                latency_s: latency.as_secs_f64(),
                timed_out: false,
            },
            Waited::TimedOut => {
                warn!(iteration, "latency iteration timed out");
                LatencySample {
                    iteration,
                    mode: config.mode,
                    latency_s: config.timeout.as_secs_f64(),
                    timed_out: true,
                }
            }
            // The samples gathered so far still make a trial record.
            Waited::LinkLost => {
                warn!(iteration, "link lost mid-trial");
                link_lost = true;
                break;
            }
        };
        debug!(
            iteration,
            latency_s = sample.latency_s,
            timed_out = sample.timed_out,
            elapsed_s = sent.elapsed().as_secs_f64(),
            "latency sample"
        );
        samples.push(sample);
        time::sleep(config.spacing).await;
    }

    if let Err(err) = link.send(&Command::Stop).await {
        command_errors += 1;
        warn!(%err, "stop command failed");
    }

    let summary = summarize(config.mode, &samples);
    let logs = match &config.log_dir {
        Some(dir) => {
            let document = json!({
                "config": {
                    "mode": config.mode,
                    "iterations": config.iterations,
                    "timeout_s": config.timeout.as_secs_f64(),
                },
                "summary": summary,
                "link_lost": link_lost,
                "command_errors": command_errors,
                "samples": samples,
            });
            Some(write_raw_logs(dir, &log_stem("latency"), &document, &samples)?)
        }
        None => None,
    };

    Ok(LatencyOutcome {
        summary,
        samples,
        command_errors,
        link_lost,
        logs,
    })
}

enum Waited {
    Arrived(Duration),
    TimedOut,
    LinkLost,
}

async fn wait_for_notification(link: &mut LinkHandle, timeout: Duration) -> Waited {
    let sent = Instant::now();
    match time::timeout(timeout, link.next_event()).await {
        Ok(Some(LinkEvent::Notification(_))) => Waited::Arrived(sent.elapsed()),
        Ok(Some(LinkEvent::LinkLost)) | Ok(None) => Waited::LinkLost,
        Err(_) => Waited::TimedOut,
    }
}

fn summarize(mode: LatencyMode, samples: &[LatencySample]) -> LatencySummary {
    let good: Vec<f64> = samples
        .iter()
        .filter(|s| !s.timed_out)
        .map(|s| s.latency_s)
        .collect();
    let timeouts = samples.len() as u32 - good.len() as u32;
    LatencySummary {
        mode,
        samples: good.len() as u32,
        timeouts,
        avg_latency_s: (!good.is_empty()).then(|| good.iter().sum::<f64>() / good.len() as f64),
        min_latency_s: good.iter().copied().reduce(f64::min),
        max_latency_s: good.iter().copied().reduce(f64::max),
    }
}
