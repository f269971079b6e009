//! Notification scheduler: the command state machine plus the per-packet
//! fault pipeline. Pure logic, no I/O and no clocks, so every branch is
//! testable with a scripted decision source.

use crate::fault::{DecisionSource, FaultProfile};
use crate::link::error::ProtocolError;
use crate::link::types::{
    encode_notification, Command, MAX_PAYLOAD_BYTES, MIN_PAYLOAD_BYTES, TX_HEADER_LEN,
};
use std::time::Duration;
use tracing::debug;

/// Streaming lifecycle. `Reset` re-arms from any state; `Start` is only
/// honored when armed or already streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Streaming,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Armed => "armed",
            SchedulerState::Streaming => "streaming",
        }
    }
}

/// Fate of one scheduled slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// Frame to hand to the transport (possibly truncated by the
    /// malform fault).
    Deliver(Vec<u8>),
    /// Slot consumed a sequence number but nothing leaves the radio.
    Dropped,
    /// Simulated link loss. No sequence number is consumed.
    Disconnect,
}

/// One scheduler step: what to emit and how long to wait before the
/// next slot.
#[derive(Debug)]
pub struct Tick {
    pub emission: Emission,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerCounters {
    /// Slots that consumed a sequence number.
    pub scheduled: u64,
    /// Frames actually handed to the transport.
    pub transmitted: u64,
    /// Slots silently eaten by the drop faults.
    pub dropped: u64,
    /// Frames truncated below the full header+payload size.
    pub malformed: u64,
    /// Frames lost to a full notification backlog (incremented by the
    /// session, not the scheduler).
    pub backlog_dropped: u64,
}

pub struct NotificationScheduler {
    state: SchedulerState,
    profile: FaultProfile,
    sequence: u16,
    payload_bytes: usize,
    /// 0 means unbounded.
    packet_count: u16,
    emitted_in_run: u32,
    burst_remaining: u32,
    base_interval: Duration,
    counters: SchedulerCounters,
}

impl NotificationScheduler {
    pub fn new(profile: FaultProfile, base_interval: Duration, default_payload: usize) -> Self {
        Self {
            state: SchedulerState::Idle,
            profile,
            sequence: 0,
            payload_bytes: clamp_payload(default_payload),
            packet_count: 0,
            emitted_in_run: 0,
            burst_remaining: 0,
            base_interval,
            counters: SchedulerCounters::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn counters(&self) -> SchedulerCounters {
        self.counters
    }

    pub fn record_backlog_drop(&mut self) {
        self.counters.backlog_dropped += 1;
        self.counters.transmitted = self.counters.transmitted.saturating_sub(1);
    }

    /// Feed one decoded command through the state machine.
    ///
    /// `Reset` is idempotent and legal in every state. A `Start` while
    /// idle is rejected so a stale command from a previous trial cannot
    /// restart the stream; the caller logs it and carries on.
    pub fn apply(&mut self, command: Command) -> Result<(), ProtocolError> {
        match (self.state, command) {
            (_, Command::Reset) => {
                self.state = SchedulerState::Armed;
                self.sequence = 0;
                self.emitted_in_run = 0;
                self.burst_remaining = 0;
                Ok(())
            }
            (SchedulerState::Armed | SchedulerState::Streaming, Command::Start { payload_bytes, packet_count }) => {
                if payload_bytes != 0 {
                    self.payload_bytes = clamp_payload(payload_bytes as usize);
                }
                self.packet_count = packet_count;
                self.emitted_in_run = 0;
                self.state = SchedulerState::Streaming;
                debug!(
                    payload = self.payload_bytes,
                    count = self.packet_count,
                    "stream started"
                );
                Ok(())
            }
            (SchedulerState::Idle, Command::Start { .. }) => {
                Err(ProtocolError::InvalidTransition("start", "idle"))
            }
            (_, Command::Stop) => {
                self.state = SchedulerState::Idle;
                Ok(())
            }
        }
    }

    /// True once a bounded run has scheduled its full packet count.
    pub fn run_complete(&self) -> bool {
        self.packet_count != 0 && self.emitted_in_run >= self.packet_count as u32
    }

    /// Abort streaming after a simulated disconnect.
    pub fn force_idle(&mut self) {
        self.state = SchedulerState::Idle;
    }

    /// A bounded run that reached its count re-arms: the device stays
    /// ready for the next Start without another Reset.
    pub fn finish_run(&mut self) {
        self.state = SchedulerState::Armed;
    }

    /// Advance one notification slot. Call only while `Streaming` and
    /// before `run_complete()` reports true.
    ///
    /// The fault order is fixed: disconnect, slot delay (interval jitter
    /// then latency spike), drop (burst first, then independent plus the
    /// RSSI-coupled extra), malform. Drops consume a sequence number and
    /// count toward a bounded run; a disconnect does not.
    pub fn next_packet(
        &mut self,
        rssi_dbm: i16,
        timestamp_ms: u16,
        dice: &mut dyn DecisionSource,
    ) -> Tick {
        if dice.chance(self.profile.disconnect_chance) {
            self.state = SchedulerState::Idle;
            return Tick {
                emission: Emission::Disconnect,
                delay: Duration::ZERO,
            };
        }

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        self.emitted_in_run += 1;
        self.counters.scheduled += 1;

        let delay = self.slot_delay(dice);

        if self.slot_dropped(rssi_dbm, dice) {
            self.counters.dropped += 1;
            return Tick {
                emission: Emission::Dropped,
                delay,
            };
        }

        let full_len = TX_HEADER_LEN + self.payload_bytes;
        let frame_len = if dice.chance(self.profile.malformed_chance) {
            self.counters.malformed += 1;
            (full_len / 2).max(2)
        } else {
            full_len
        };
        let mut frame = encode_notification(sequence, timestamp_ms, full_len);
        frame.truncate(frame_len);
        self.counters.transmitted += 1;

        Tick {
            emission: Emission::Deliver(frame),
            delay,
        }
    }

    fn slot_dropped(&mut self, rssi_dbm: i16, dice: &mut dyn DecisionSource) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }
        if self.profile.drop_burst_len > 0 && dice.chance(self.profile.drop_burst_percent) {
            self.burst_remaining = self.profile.drop_burst_len.saturating_sub(1);
            return true;
        }
        let mut percent = self.profile.drop_percent;
        if rssi_dbm < self.profile.rssi_drop_threshold_dbm {
            percent += self.profile.rssi_drop_extra_percent;
        }
        dice.chance(percent)
    }

    fn slot_delay(&mut self, dice: &mut dyn DecisionSource) -> Duration {
        let base_ms = self.base_interval.as_millis() as i64;
        let jittered = (base_ms + dice.jitter(self.profile.interval_jitter_ms)).max(1);
        let spike_ms = if dice.chance(self.profile.latency_spike_chance) {
            self.profile.latency_spike_ms
        } else {
            0
        };
        Duration::from_millis(jittered as u64 + spike_ms)
    }
}

fn clamp_payload(requested: usize) -> usize {
    requested.clamp(MIN_PAYLOAD_BYTES, MAX_PAYLOAD_BYTES)
}
