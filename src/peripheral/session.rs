//! Simulated peripheral: accepts one link at a time and runs a streaming
//! session task that drives the scheduler against the tokio clock.

use crate::fault::{DecisionSource, FaultProfile, RngSource};
use crate::link::{
    Command, Connector, LinkCaps, LinkError, LinkEvent, LinkHandle, LinkResult,
};
use crate::peripheral::rssi::RssiSynth;
use crate::peripheral::scheduler::{Emission, NotificationScheduler, SchedulerState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

const COMMAND_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct PeripheralConfig {
    /// Target notification rate while streaming.
    pub notify_hz: u32,
    /// Payload size used when Start carries a zero size operand.
    pub default_payload: usize,
    /// Notification buffer depth; overflow counts as backlog loss.
    pub backlog_limit: usize,
    pub caps: LinkCaps,
    /// Fixed seed for the fault decisions; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            notify_hz: 40,
            default_payload: 120,
            backlog_limit: 256,
            caps: LinkCaps::default(),
            seed: None,
        }
    }
}

/// In-process device under test. Lives for a whole sweep; each `connect`
/// spins up a fresh session with a fresh scheduler and RSSI synth.
pub struct MockPeripheral {
    profile: FaultProfile,
    config: PeripheralConfig,
    busy: Arc<AtomicBool>,
    connects: Arc<AtomicU64>,
}

impl MockPeripheral {
    pub fn new(profile: FaultProfile, config: PeripheralConfig) -> Self {
        Self {
            profile,
            config,
            busy: Arc::new(AtomicBool::new(false)),
            connects: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total links ever accepted, across retries and trials.
    pub fn connects_made(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for MockPeripheral {
    async fn connect(&self, _timeout: Duration) -> LinkResult<LinkHandle> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LinkError::Refused("session already active".into()));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (evt_tx, evt_rx) = mpsc::channel(self.config.backlog_limit.max(1));
        let rssi = Arc::new(Mutex::new(RssiSynth::from_profile(&self.profile)));

        let dice: Box<dyn DecisionSource> = match self.config.seed {
            Some(seed) => Box::new(RngSource::seeded(seed)),
            None => Box::new(RngSource::from_entropy()),
        };
        let guard = BusyGuard(Arc::clone(&self.busy));
        let session = TestSession {
            scheduler: NotificationScheduler::new(
                self.profile.clone(),
                notify_interval(self.config.notify_hz),
                self.config.default_payload,
            ),
            ignore_chance: self.profile.command_ignore_chance,
            dice,
            rssi: Arc::clone(&rssi),
        };
        tokio::spawn(async move {
            let _guard = guard;
            session.run(cmd_rx, evt_tx).await;
        });

        Ok(LinkHandle::new(cmd_tx, evt_rx, self.config.caps).with_rssi(rssi))
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct TestSession {
    scheduler: NotificationScheduler,
    ignore_chance: f64,
    dice: Box<dyn DecisionSource>,
    rssi: Arc<Mutex<RssiSynth>>,
}

impl TestSession {
    async fn run(mut self, mut commands: mpsc::Receiver<Vec<u8>>, events: mpsc::Sender<LinkEvent>) {
        let started = Instant::now();
        let mut next_emit = Instant::now();

        loop {
            if self.scheduler.state() == SchedulerState::Streaming && self.scheduler.run_complete()
            {
                debug!(counters = ?self.scheduler.counters(), "bounded run complete");
                self.scheduler.finish_run();
            }

            if self.scheduler.state() == SchedulerState::Streaming {
                tokio::select! {
                    maybe = commands.recv() => match maybe {
                        Some(frame) => self.handle_command(&frame),
                        None => break,
                    },
                    _ = time::sleep_until(next_emit) => {
                        let rssi_dbm = self.rssi.lock().sample_now();
                        let timestamp = (started.elapsed().as_millis() & 0xFFFF) as u16;
                        let tick =
                            self.scheduler
                                .next_packet(rssi_dbm, timestamp, self.dice.as_mut());
                        next_emit = Instant::now() + tick.delay;
                        match tick.emission {
                            Emission::Deliver(frame) => {
                                if events.try_send(LinkEvent::Notification(frame)).is_err() {
                                    self.scheduler.record_backlog_drop();
                                }
                            }
                            Emission::Dropped => {}
                            Emission::Disconnect => {
                                warn!("simulated link loss");
                                let _ = events.try_send(LinkEvent::LinkLost);
                                break;
                            }
                        }
                    }
                }
            } else {
                match commands.recv().await {
                    Some(frame) => {
                        self.handle_command(&frame);
                        next_emit = Instant::now();
                    }
                    None => break,
                }
            }
        }
        debug!(counters = ?self.scheduler.counters(), "session ended");
    }

    /// The command characteristic is write-without-response: bad traffic
    /// is logged and swallowed, never answered.
    fn handle_command(&mut self, frame: &[u8]) {
        if self.dice.chance(self.ignore_chance) {
            warn!(len = frame.len(), "command dropped by ignore fault");
            return;
        }
        match Command::decode(frame) {
            Ok(command) => {
                if let Err(err) = self.scheduler.apply(command) {
                    warn!(%err, "command rejected");
                } else {
                    debug!(command = command.name(), state = self.scheduler.state().as_str(), "command applied");
                }
            }
            Err(err) => warn!(%err, "unparseable command"),
        }
    }
}

fn notify_interval(notify_hz: u32) -> Duration {
    Duration::from_millis((1000 / notify_hz.max(1)).max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::decode_notification;

    fn quiet_peripheral(profile: FaultProfile) -> MockPeripheral {
        MockPeripheral::new(
            profile,
            PeripheralConfig {
                seed: Some(11),
                ..PeripheralConfig::default()
            },
        )
    }

    async fn start_stream(link: &LinkHandle, payload: u8, count: u16) {
        link.send(&Command::Reset).await.unwrap();
        link.send(&Command::Start {
            payload_bytes: payload,
            packet_count: count,
        })
        .await
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_run_emits_exact_count() {
        let dut = quiet_peripheral(FaultProfile::best());
        let mut link = dut.connect(Duration::from_secs(5)).await.unwrap();
        start_stream(&link, 20, 5).await;

        let mut sequences = Vec::new();
        while sequences.len() < 5 {
            match link.next_event().await.unwrap() {
                LinkEvent::Notification(frame) => {
                    sequences.push(decode_notification(&frame).unwrap().sequence)
                }
                LinkEvent::LinkLost => panic!("unexpected link loss"),
            }
        }
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

        // The run is complete; no further packets arrive.
        let extra = time::timeout(Duration::from_millis(500), link.next_event()).await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_session_at_a_time() {
        let dut = quiet_peripheral(FaultProfile::best());
        let link = dut.connect(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            dut.connect(Duration::from_secs(5)).await,
            Err(LinkError::Refused(_))
        ));

        drop(link);
        // Give the session task a chance to observe the closed channel.
        time::sleep(Duration::from_millis(10)).await;
        assert!(dut.connect(Duration::from_secs(5)).await.is_ok());
        assert_eq!(dut.connects_made(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_start_leaves_stream_silent() {
        let profile = FaultProfile {
            command_ignore_chance: 100.0,
            ..FaultProfile::best()
        };
        let dut = quiet_peripheral(profile);
        let mut link = dut.connect(Duration::from_secs(5)).await.unwrap();
        start_stream(&link, 20, 5).await;

        let got = time::timeout(Duration::from_millis(500), link.next_event()).await;
        assert!(got.is_err(), "ignored commands must not start the stream");
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_disconnect_reports_link_lost() {
        let profile = FaultProfile {
            disconnect_chance: 100.0,
            ..FaultProfile::best()
        };
        let dut = quiet_peripheral(profile);
        let mut link = dut.connect(Duration::from_secs(5)).await.unwrap();
        start_stream(&link, 20, 0).await;

        assert_eq!(link.next_event().await.unwrap(), LinkEvent::LinkLost);
        // The session tears down afterwards.
        assert_eq!(link.next_event().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_command_is_swallowed() {
        let dut = quiet_peripheral(FaultProfile::best());
        let mut link = dut.connect(Duration::from_secs(5)).await.unwrap();
        link.write_command(&[0x7F, 0x01]).await.unwrap();
        start_stream(&link, 20, 1).await;
        // Session is still healthy after the garbage frame.
        assert!(matches!(
            link.next_event().await.unwrap(),
            LinkEvent::Notification(_)
        ));
    }
}
