//! Throughput trial: arm the device, stream for a fixed window or packet
//! count, and reduce the notification flow to a summary.

use crate::client::cancel::CancelToken;
use crate::client::error::{ClientError, ClientResult};
use crate::client::logs::{log_stem, write_raw_logs, RawLogs};
use crate::client::metrics::{MetricsEngine, ThroughputSummary};
use crate::link::{Command, LinkEvent, LinkHandle};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// Quiet period after which a bounded run is considered finished even if
/// drops kept the packet count from being reached.
const BOUNDED_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ThroughputConfig {
    /// Requested notification payload; 0 keeps the device default.
    pub payload_bytes: u8,
    /// Packets to request; 0 streams until `duration` elapses.
    pub packet_count: u16,
    pub duration: Duration,
    /// Pause between Reset and Start so stale notifications drain.
    pub settle: Duration,
    /// Where to write the raw JSON/CSV pair; `None` skips logging.
    pub log_dir: Option<PathBuf>,
}

impl Default for ThroughputConfig {
    fn default() -> Self {
        Self {
            payload_bytes: 0,
            packet_count: 0,
            duration: Duration::from_secs(5),
            settle: Duration::from_millis(100),
            log_dir: None,
        }
    }
}

#[derive(Debug)]
pub struct ThroughputOutcome {
    pub summary: ThroughputSummary,
    /// Non-fatal command write failures (a Stop after link loss, say).
    pub command_errors: u32,
    pub link_lost: bool,
    pub logs: Option<RawLogs>,
}

pub async fn run_throughput(
    link: &mut LinkHandle,
    config: &ThroughputConfig,
    cancel: &mut CancelToken,
) -> ClientResult<ThroughputOutcome> {
    let mut command_errors = 0u32;

    link.send(&Command::Reset).await?;
    time::sleep(config.settle).await;
    link.drain_events();

    link.send(&Command::Start {
        payload_bytes: config.payload_bytes,
        packet_count: config.packet_count,
    })
    .await?;

    let started = Instant::now();
    let mut engine = MetricsEngine::new();
    let mut link_lost = false;
    let bounded = config.packet_count != 0;
    let deadline = started + config.duration;

    loop {
        if cancel.is_cancelled() {
            stop_stream(link, &mut command_errors).await;
            return Err(ClientError::Cancelled);
        }
        let event = if bounded {
            // Bounded runs end on count or on stream silence.
            match time::timeout(BOUNDED_IDLE_TIMEOUT, link.next_event()).await {
                Ok(event) => event,
                Err(_) => {
                    debug!("bounded run went quiet");
                    break;
                }
            }
        } else {
            tokio::select! {
                event = link.next_event() => event,
                _ = time::sleep_until(deadline) => break,
                _ = cancel.cancelled() => {
                    let _ = stop_stream(link, &mut command_errors).await;
                    return Err(ClientError::Cancelled);
                }
            }
        };

        match event {
            Some(LinkEvent::Notification(frame)) => {
                engine.record_frame(&frame);
                if bounded && engine.packets() >= config.packet_count as u64 {
                    break;
                }
            }
            Some(LinkEvent::LinkLost) => {
                warn!("link lost mid-stream");
                link_lost = true;
                break;
            }
            None => {
                warn!("event channel closed mid-stream");
                link_lost = true;
                break;
            }
        }
    }

    let duration_s = started.elapsed().as_secs_f64();
    stop_stream(link, &mut command_errors).await;

    let summary = engine.summarize(duration_s);
    debug!(
        packets = summary.packets,
        lost = summary.estimated_lost_packets,
        kbps = summary.throughput_kbps,
        "throughput trial done"
    );

    let logs = match &config.log_dir {
        Some(dir) => {
            let document = json!({
                "config": {
                    "payload_bytes": config.payload_bytes,
                    "packet_count": config.packet_count,
                    "duration_s": config.duration.as_secs_f64(),
                },
                "summary": summary,
                "link_lost": link_lost,
                "command_errors": command_errors,
                "packets": engine.records(),
            });
            Some(write_raw_logs(
                dir,
                &log_stem("throughput"),
                &document,
                engine.records(),
            )?)
        }
        None => None,
    };

    Ok(ThroughputOutcome {
        summary,
        command_errors,
        link_lost,
        logs,
    })
}

async fn stop_stream(link: &mut LinkHandle, command_errors: &mut u32) {
    if let Err(err) = link.send(&Command::Stop).await {
        *command_errors += 1;
        warn!(%err, "stop command failed");
    }
}
