//! Wire contract for the throughput test service.
//!
//! TX notifications carry `[SEQ_LO][SEQ_HI][TS_LO][TS_HI][DATA...]` with
//! sequence and device timestamp as little-endian u16, both wrapping at
//! 65536. RX commands are a single opcode byte plus operands.

use crate::link::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Notification header: 2 bytes sequence + 2 bytes device timestamp.
pub const TX_HEADER_LEN: usize = 4;
/// Filler byte used to pad notification payloads to the requested size.
pub const PAYLOAD_FILLER: u8 = 0xAA;

pub const OPCODE_START: u8 = 0x01;
pub const OPCODE_STOP: u8 = 0x02;
pub const OPCODE_RESET: u8 = 0x03;

/// Payload size bounds imposed by ATT (header excluded on the low end).
pub const MIN_PAYLOAD_BYTES: usize = 4;
pub const MAX_PAYLOAD_BYTES: usize = 244;

/// Control command written to the RX characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Begin streaming. `packet_count` 0 means unbounded until Stop.
    Start { payload_bytes: u8, packet_count: u16 },
    Stop,
    Reset,
}

impl Command {
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Command::Start {
                payload_bytes,
                packet_count,
            } => {
                let mut frame = Vec::with_capacity(4);
                frame.push(OPCODE_START);
                frame.push(payload_bytes);
                frame.extend_from_slice(&packet_count.to_le_bytes());
                frame
            }
            Command::Stop => vec![OPCODE_STOP],
            Command::Reset => vec![OPCODE_RESET],
        }
    }

    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let opcode = *frame.first().ok_or(ProtocolError::EmptyCommand)?;
        match opcode {
            OPCODE_START => {
                let payload_bytes = frame.get(1).copied().unwrap_or(0);
                let packet_count = match frame.get(2..4) {
                    Some(bytes) => u16::from_le_bytes([bytes[0], bytes[1]]),
                    None => 0,
                };
                Ok(Command::Start {
                    payload_bytes,
                    packet_count,
                })
            }
            OPCODE_STOP => Ok(Command::Stop),
            OPCODE_RESET => Ok(Command::Reset),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start { .. } => "start",
            Command::Stop => "stop",
            Command::Reset => "reset",
        }
    }
}

/// Encode one notification frame of exactly `total_len` bytes.
pub fn encode_notification(sequence: u16, timestamp_ms: u16, total_len: usize) -> Vec<u8> {
    let total_len = total_len.max(TX_HEADER_LEN);
    let mut frame = Vec::with_capacity(total_len);
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.extend_from_slice(&timestamp_ms.to_le_bytes());
    frame.resize(total_len, PAYLOAD_FILLER);
    frame
}

/// A decoded notification header. Frames shorter than the header are
/// malformed and decode to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationHeader {
    pub sequence: u16,
    pub timestamp_ms: u16,
    pub payload_len: usize,
    pub raw_len: usize,
}

pub fn decode_notification(frame: &[u8]) -> Option<NotificationHeader> {
    if frame.len() < TX_HEADER_LEN {
        return None;
    }
    Some(NotificationHeader {
        sequence: u16::from_le_bytes([frame[0], frame[1]]),
        timestamp_ms: u16::from_le_bytes([frame[2], frame[3]]),
        payload_len: frame.len() - TX_HEADER_LEN,
        raw_len: frame.len(),
    })
}

/// Event delivered to the client over the notification channel, in
/// arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Notification(Vec<u8>),
    /// The link dropped mid-stream (simulated or real). Distinct from an
    /// orderly Stop, which simply ends the packet flow.
    LinkLost,
}

/// Requested physical-layer mode for a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhyMode {
    Auto,
    #[serde(rename = "1m")]
    OneM,
    #[serde(rename = "2m")]
    TwoM,
    Coded,
}

impl PhyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhyMode::Auto => "auto",
            PhyMode::OneM => "1m",
            PhyMode::TwoM => "2m",
            PhyMode::Coded => "coded",
        }
    }
}

impl fmt::Display for PhyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(PhyMode::Auto),
            "1m" => Ok(PhyMode::OneM),
            "2m" => Ok(PhyMode::TwoM),
            "coded" => Ok(PhyMode::Coded),
            other => Err(format!("unknown PHY mode: {other}")),
        }
    }
}

/// Outcome of a best-effort capability request (MTU/PHY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    Success,
    Failed,
    Skipped,
    Unsupported,
}
