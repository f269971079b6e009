//! Radio boundary between the measurement client and the device under
//! test. Commands flow in over a write channel, notifications flow back
//! over a bounded event channel whose capacity models the controller's
//! notification buffer.

pub mod error;
pub mod types;

pub use error::{LinkError, LinkResult, ProtocolError};
pub use types::{
    decode_notification, encode_notification, Command, LinkEvent, NegotiationStatus,
    NotificationHeader, PhyMode, MAX_PAYLOAD_BYTES, MIN_PAYLOAD_BYTES, OPCODE_RESET,
    OPCODE_START, OPCODE_STOP, PAYLOAD_FILLER, TX_HEADER_LEN,
};

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// On-demand RSSI supplier attached to a link (synthesized on the mock
/// peripheral; a real backend may not expose one at all).
pub trait RssiSource: Send {
    fn sample(&mut self) -> i16;
}

/// What the peer supports for one-time capability negotiation.
#[derive(Debug, Clone, Copy)]
pub struct LinkCaps {
    /// Largest MTU the peer will grant; `None` means the backend cannot
    /// negotiate MTU at all.
    pub max_mtu: Option<u16>,
    /// Whether a PHY preference request is honored.
    pub phy_switch: bool,
}

impl Default for LinkCaps {
    fn default() -> Self {
        Self {
            max_mtu: Some(247),
            phy_switch: true,
        }
    }
}

/// One established link. Owns the command writer and the notification
/// receiver for the lifetime of a single trial.
pub struct LinkHandle {
    commands: Option<mpsc::Sender<Vec<u8>>>,
    events: mpsc::Receiver<LinkEvent>,
    caps: LinkCaps,
    rssi: Option<Arc<Mutex<dyn RssiSource>>>,
}

impl LinkHandle {
    pub fn new(
        commands: mpsc::Sender<Vec<u8>>,
        events: mpsc::Receiver<LinkEvent>,
        caps: LinkCaps,
    ) -> Self {
        Self {
            commands: Some(commands),
            events,
            caps,
            rssi: None,
        }
    }

    pub fn with_rssi(mut self, source: Arc<Mutex<dyn RssiSource>>) -> Self {
        self.rssi = Some(source);
        self
    }

    /// Write a raw command frame (write-without-response semantics: the
    /// only acknowledgment is the behavioral effect on the stream).
    pub async fn write_command(&self, frame: &[u8]) -> LinkResult<()> {
        let tx = self
            .commands
            .as_ref()
            .ok_or_else(|| LinkError::Closed("link already disconnected".into()))?;
        tx.send(frame.to_vec())
            .await
            .map_err(|_| LinkError::Closed("peer gone".into()))
    }

    pub async fn send(&self, command: &Command) -> LinkResult<()> {
        self.write_command(&command.encode()).await
    }

    /// Next event in arrival order. `None` means the peer ended the
    /// session and the channel drained.
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<LinkEvent> {
        self.events.try_recv().ok()
    }

    /// Drop any notifications that are already queued.
    pub fn drain_events(&mut self) {
        while self.events.try_recv().is_ok() {}
    }

    pub fn request_mtu(&self, requested: u16) -> LinkResult<u16> {
        match self.caps.max_mtu {
            Some(max) => Ok(requested.min(max)),
            None => Err(LinkError::Unsupported("mtu")),
        }
    }

    pub fn request_phy(&self, _phy: PhyMode) -> LinkResult<()> {
        if self.caps.phy_switch {
            Ok(())
        } else {
            Err(LinkError::Unsupported("phy"))
        }
    }

    pub fn read_rssi(&self) -> Option<i16> {
        self.rssi.as_ref().map(|src| src.lock().sample())
    }

    /// Release the link. Idempotent; the peer observes the command
    /// channel closing and tears down its session.
    pub fn close(&mut self) {
        self.commands = None;
        self.events.close();
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_none()
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Anything that can produce a fresh link to a target. The mock
/// peripheral is the in-tree implementation; tests add flaky variants.
pub trait Connector: Send + Sync {
    fn connect(&self, timeout: Duration) -> impl Future<Output = LinkResult<LinkHandle>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback(caps: LinkCaps) -> (LinkHandle, mpsc::Receiver<Vec<u8>>, mpsc::Sender<LinkEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (evt_tx, evt_rx) = mpsc::channel(8);
        (LinkHandle::new(cmd_tx, evt_rx, caps), cmd_rx, evt_tx)
    }

    #[tokio::test]
    async fn test_command_write_reaches_peer() {
        let (link, mut cmd_rx, _evt_tx) = loopback(LinkCaps::default());
        link.send(&Command::Reset).await.unwrap();
        assert_eq!(cmd_rx.recv().await.unwrap(), vec![OPCODE_RESET]);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (mut link, _cmd_rx, _evt_tx) = loopback(LinkCaps::default());
        link.close();
        assert!(matches!(
            link.send(&Command::Stop).await,
            Err(LinkError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn test_mtu_clamps_to_capability() {
        let (link, _c, _e) = loopback(LinkCaps {
            max_mtu: Some(185),
            phy_switch: true,
        });
        assert_eq!(link.request_mtu(247).unwrap(), 185);
        assert_eq!(link.request_mtu(100).unwrap(), 100);
    }

    #[tokio::test]
    async fn test_unsupported_capabilities() {
        let (link, _c, _e) = loopback(LinkCaps {
            max_mtu: None,
            phy_switch: false,
        });
        assert!(matches!(link.request_mtu(247), Err(LinkError::Unsupported("mtu"))));
        assert!(matches!(
            link.request_phy(PhyMode::TwoM),
            Err(LinkError::Unsupported("phy"))
        ));
    }

    #[tokio::test]
    async fn test_events_preserve_arrival_order() {
        let (mut link, _cmd_rx, evt_tx) = loopback(LinkCaps::default());
        for seq in 0..3u16 {
            evt_tx
                .send(LinkEvent::Notification(encode_notification(seq, 0, 8)))
                .await
                .unwrap();
        }
        for seq in 0..3u16 {
            match link.next_event().await.unwrap() {
                LinkEvent::Notification(frame) => {
                    assert_eq!(decode_notification(&frame).unwrap().sequence, seq)
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
