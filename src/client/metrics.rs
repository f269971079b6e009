//! Sequence-gap metrics over the notification stream.
//!
//! Loss is estimated purely from gaps in the wrapping u16 sequence; a gap
//! of `g > 1` means `g - 1` packets went missing. Backward or zero gaps
//! are reordered or duplicate deliveries and never reduce the loss count.

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;

/// Treated as "old packet" rather than a huge forward gap.
const REORDER_WINDOW: u16 = 32768;

/// Raw per-packet log entry, one per accepted notification.
#[derive(Debug, Clone, Serialize)]
pub struct PacketRecord {
    pub seq: u16,
    pub dut_ts: u16,
    pub arrival_time: f64,
    pub payload_len: usize,
    pub raw_len: usize,
    pub arrival_epoch: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThroughputSummary {
    pub packets: u64,
    pub estimated_lost_packets: u64,
    pub reordered_packets: u64,
    pub malformed_frames: u64,
    pub duration_s: f64,
    pub throughput_kbps: f64,
    pub notification_rate_per_s: f64,
    pub bytes_recorded: u64,
    pub avg_jitter_ms: Option<f64>,
}

pub struct MetricsEngine {
    started: Instant,
    last: Option<LastPacket>,
    packets: u64,
    lost: u64,
    reordered: u64,
    malformed: u64,
    bytes: u64,
    jitter_sum_ms: f64,
    jitter_samples: u64,
    records: Vec<PacketRecord>,
}

struct LastPacket {
    seq: u16,
    dut_ts: u16,
    arrival: Instant,
}

impl MetricsEngine {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last: None,
            packets: 0,
            lost: 0,
            reordered: 0,
            malformed: 0,
            bytes: 0,
            jitter_sum_ms: 0.0,
            jitter_samples: 0,
            records: Vec::new(),
        }
    }

    /// Ingest one raw notification frame.
    pub fn record_frame(&mut self, frame: &[u8]) {
        let arrival = Instant::now();
        let Some(header) = crate::link::decode_notification(frame) else {
            self.malformed += 1;
            return;
        };

        self.packets += 1;
        self.bytes += header.raw_len as u64;

        if let Some(last) = &self.last {
            let gap = header.sequence.wrapping_sub(last.seq);
            if gap == 0 || gap >= REORDER_WINDOW {
                self.reordered += 1;
                // Old or duplicate packet: the watermark stays at the
                // newest in-order sequence.
                self.push_record(&header, arrival);
                return;
            }
            if gap > 1 {
                self.lost += (gap - 1) as u64;
            } else {
                // In-order successor: compare wall delta with the DUT's
                // own timestamp delta.
                let wall_ms = arrival.duration_since(last.arrival).as_secs_f64() * 1000.0;
                let dut_ms = header.timestamp_ms.wrapping_sub(last.dut_ts) as f64;
                self.jitter_sum_ms += (wall_ms - dut_ms).abs();
                self.jitter_samples += 1;
            }
        }
        self.push_record(&header, arrival);
        self.last = Some(LastPacket {
            seq: header.sequence,
            dut_ts: header.timestamp_ms,
            arrival,
        });
    }

    fn push_record(&mut self, header: &crate::link::NotificationHeader, arrival: Instant) {
        self.records.push(PacketRecord {
            seq: header.sequence,
            dut_ts: header.timestamp_ms,
            arrival_time: arrival.duration_since(self.started).as_secs_f64(),
            payload_len: header.payload_len,
            raw_len: header.raw_len,
            arrival_epoch: Utc::now().timestamp_micros() as f64 / 1e6,
        });
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PacketRecord> {
        self.records
    }

    pub fn summarize(&self, duration_s: f64) -> ThroughputSummary {
        let (throughput_kbps, notification_rate_per_s) = if duration_s > 0.0 {
            (
                self.bytes as f64 * 8.0 / duration_s / 1000.0,
                self.packets as f64 / duration_s,
            )
        } else {
            (0.0, 0.0)
        };
        ThroughputSummary {
            packets: self.packets,
            estimated_lost_packets: self.lost,
            reordered_packets: self.reordered,
            malformed_frames: self.malformed,
            duration_s,
            throughput_kbps,
            notification_rate_per_s,
            bytes_recorded: self.bytes,
            avg_jitter_ms: (self.jitter_samples > 0)
                .then(|| self.jitter_sum_ms / self.jitter_samples as f64),
        }
    }
}

impl Default for MetricsEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::encode_notification;

    fn feed(engine: &mut MetricsEngine, seqs: &[u16]) {
        for &seq in seqs {
            engine.record_frame(&encode_notification(seq, 0, 24));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_contiguous_stream_has_no_loss() {
        let mut engine = MetricsEngine::new();
        feed(&mut engine, &[0, 1, 2, 3, 4]);
        let summary = engine.summarize(1.0);
        assert_eq!(summary.packets, 5);
        assert_eq!(summary.estimated_lost_packets, 0);
        assert_eq!(summary.reordered_packets, 0);
        assert_eq!(summary.bytes_recorded, 5 * 24);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_counts_missing_packets() {
        let mut engine = MetricsEngine::new();
        feed(&mut engine, &[0, 1, 5, 6]);
        let summary = engine.summarize(1.0);
        assert_eq!(summary.packets, 4);
        assert_eq!(summary.estimated_lost_packets, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wraparound_is_not_loss() {
        let mut engine = MetricsEngine::new();
        feed(&mut engine, &[65534, 65535, 0, 1]);
        let summary = engine.summarize(1.0);
        assert_eq!(summary.estimated_lost_packets, 0);
        assert_eq!(summary.reordered_packets, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reordering_never_reduces_loss() {
        let mut engine = MetricsEngine::new();
        // 3 arrives early (gap 2, one lost), then 2 shows up late.
        feed(&mut engine, &[0, 1, 3, 2, 4]);
        let summary = engine.summarize(1.0);
        assert_eq!(summary.estimated_lost_packets, 1);
        assert_eq!(summary.reordered_packets, 1);
        assert_eq!(summary.packets, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_is_reordered() {
        let mut engine = MetricsEngine::new();
        feed(&mut engine, &[0, 1, 1, 2]);
        let summary = engine.summarize(1.0);
        assert_eq!(summary.reordered_packets, 1);
        assert_eq!(summary.estimated_lost_packets, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_frames_counted_malformed() {
        let mut engine = MetricsEngine::new();
        engine.record_frame(&[0x01, 0x02]);
        feed(&mut engine, &[0, 1]);
        let summary = engine.summarize(1.0);
        assert_eq!(summary.malformed_frames, 1);
        assert_eq!(summary.packets, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throughput_math() {
        let mut engine = MetricsEngine::new();
        // 200 packets of 24 raw bytes over 5 seconds.
        for seq in 0..200u16 {
            engine.record_frame(&encode_notification(seq, 0, 24));
        }
        let summary = engine.summarize(5.0);
        assert!((summary.throughput_kbps - 7.68).abs() < 1e-9);
        assert!((summary.notification_rate_per_s - 40.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_tracks_timestamp_deltas() {
        let mut engine = MetricsEngine::new();
        // DUT claims 25ms between packets; wall clock agrees exactly.
        engine.record_frame(&encode_notification(0, 100, 24));
        tokio::time::advance(std::time::Duration::from_millis(25)).await;
        engine.record_frame(&encode_notification(1, 125, 24));
        tokio::time::advance(std::time::Duration::from_millis(35)).await;
        engine.record_frame(&encode_notification(2, 150, 24));
        let summary = engine.summarize(1.0);
        // First pair perfect, second pair 10ms off; mean 5ms.
        assert!((summary.avg_jitter_ms.unwrap() - 5.0).abs() < 1e-6);
    }
}
