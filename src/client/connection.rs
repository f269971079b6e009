//! Connection establishment with bounded retries and a full attempt
//! history, plus best-effort MTU/PHY negotiation.

use crate::client::cancel::CancelToken;
use crate::client::error::{ClientError, ClientResult};
use crate::link::{Connector, LinkHandle, NegotiationStatus, PhyMode};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Error(String),
}

/// One connection attempt, kept whether it succeeded or not so failed
/// trials can report exactly what happened.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionAttempt {
    pub attempt_index: u32,
    pub timeout_s: f64,
    pub outcome: AttemptOutcome,
    pub elapsed_s: f64,
}

/// Result of the post-connect capability requests. Negotiation never
/// fails a trial; anything short of success is only a warning.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct NegotiationReport {
    pub mtu: NegotiationStatus,
    pub granted_mtu: Option<u16>,
    pub phy: NegotiationStatus,
}

/// An established link plus how it came to be.
pub struct ManagedLink {
    pub link: LinkHandle,
    pub attempts: Vec<ConnectionAttempt>,
    pub negotiation: NegotiationReport,
}

impl ManagedLink {
    pub fn attempts_used(&self) -> u32 {
        self.attempts.len() as u32
    }
}

pub struct ConnectionManager<'a, C: Connector> {
    connector: &'a C,
    target: String,
    policy: RetryPolicy,
}

impl<'a, C: Connector> ConnectionManager<'a, C> {
    pub fn new(connector: &'a C, target: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            target: target.into(),
            policy,
        }
    }

    /// Connect with sequential attempts and a fixed, cancellable delay
    /// between them. On success the requested MTU/PHY are negotiated
    /// best-effort before the link is handed back.
    pub async fn establish(
        &self,
        mtu: Option<u16>,
        phy: PhyMode,
        cancel: &mut CancelToken,
    ) -> ClientResult<ManagedLink> {
        let mut attempts = Vec::with_capacity(self.policy.attempts as usize);
        for attempt_index in 1..=self.policy.attempts.max(1) {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            let started = Instant::now();
            let result = time::timeout(
                self.policy.timeout,
                self.connector.connect(self.policy.timeout),
            )
            .await;
            let elapsed_s = started.elapsed().as_secs_f64();

            match result {
                Ok(Ok(link)) => {
                    attempts.push(ConnectionAttempt {
                        attempt_index,
                        timeout_s: self.policy.timeout.as_secs_f64(),
                        outcome: AttemptOutcome::Success,
                        elapsed_s,
                    });
                    info!(
                        target = %self.target,
                        attempt = attempt_index,
                        "connected"
                    );
                    let negotiation = negotiate(&link, mtu, phy);
                    return Ok(ManagedLink {
                        link,
                        attempts,
                        negotiation,
                    });
                }
                Ok(Err(err)) => {
                    warn!(target = %self.target, attempt = attempt_index, %err, "connect failed");
                    attempts.push(ConnectionAttempt {
                        attempt_index,
                        timeout_s: self.policy.timeout.as_secs_f64(),
                        outcome: AttemptOutcome::Error(err.to_string()),
                        elapsed_s,
                    });
                }
                Err(_) => {
                    warn!(
                        target = %self.target,
                        attempt = attempt_index,
                        timeout_s = self.policy.timeout.as_secs_f64(),
                        "connect timed out"
                    );
                    attempts.push(ConnectionAttempt {
                        attempt_index,
                        timeout_s: self.policy.timeout.as_secs_f64(),
                        outcome: AttemptOutcome::Timeout,
                        elapsed_s,
                    });
                }
            }

            if attempt_index < self.policy.attempts {
                tokio::select! {
                    _ = time::sleep(self.policy.retry_delay) => {}
                    _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                }
            }
        }
        Err(ClientError::ConnectionExhausted {
            target: self.target.clone(),
            attempts,
        })
    }
}

fn negotiate(link: &LinkHandle, mtu: Option<u16>, phy: PhyMode) -> NegotiationReport {
    let (mtu_status, granted_mtu) = match mtu {
        None => (NegotiationStatus::Skipped, None),
        Some(requested) => match link.request_mtu(requested) {
            Ok(granted) => {
                if granted < requested {
                    warn!(requested, granted, "MTU negotiated below request");
                }
                (NegotiationStatus::Success, Some(granted))
            }
            Err(crate::link::LinkError::Unsupported(_)) => {
                warn!("MTU negotiation unsupported on this link");
                (NegotiationStatus::Unsupported, None)
            }
            Err(err) => {
                warn!(%err, "MTU negotiation failed");
                (NegotiationStatus::Failed, None)
            }
        },
    };

    let phy_status = match phy {
        PhyMode::Auto => NegotiationStatus::Skipped,
        requested => match link.request_phy(requested) {
            Ok(()) => NegotiationStatus::Success,
            Err(crate::link::LinkError::Unsupported(_)) => {
                warn!(phy = %requested, "PHY preference unsupported on this link");
                NegotiationStatus::Unsupported
            }
            Err(err) => {
                warn!(phy = %requested, %err, "PHY preference failed");
                NegotiationStatus::Failed
            }
        },
    };

    NegotiationReport {
        mtu: mtu_status,
        granted_mtu,
        phy: phy_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkCaps, LinkError, LinkEvent, LinkResult};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    fn bare_link(caps: LinkCaps) -> LinkHandle {
        let (cmd_tx, _cmd_rx) = mpsc::channel(4);
        let (_evt_tx, evt_rx) = mpsc::channel::<LinkEvent>(4);
        LinkHandle::new(cmd_tx, evt_rx, caps)
    }

    /// Fails the first `failures` attempts, then accepts.
    struct Flaky {
        failures: u32,
        seen: AtomicU32,
    }

    impl Connector for Flaky {
        async fn connect(&self, _timeout: Duration) -> LinkResult<LinkHandle> {
            let n = self.seen.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LinkError::Refused("not yet".into()))
            } else {
                Ok(bare_link(LinkCaps::default()))
            }
        }
    }

    /// Never completes within any timeout.
    struct BlackHole;

    impl Connector for BlackHole {
        async fn connect(&self, _timeout: Duration) -> LinkResult<LinkHandle> {
            std::future::pending().await
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            timeout: Duration::from_secs(1),
            retry_delay: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success_with_history() {
        let connector = Flaky {
            failures: 2,
            seen: AtomicU32::new(0),
        };
        let manager = ConnectionManager::new(&connector, "AA:BB", policy());
        let mut cancel = CancelToken::disarmed();
        let managed = manager
            .establish(None, PhyMode::Auto, &mut cancel)
            .await
            .unwrap();
        assert_eq!(managed.attempts_used(), 3);
        assert!(matches!(managed.attempts[0].outcome, AttemptOutcome::Error(_)));
        assert!(matches!(managed.attempts[1].outcome, AttemptOutcome::Error(_)));
        assert_eq!(managed.attempts[2].outcome, AttemptOutcome::Success);
        assert_eq!(managed.attempts[2].attempt_index, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_carries_full_history() {
        let connector = BlackHole;
        let manager = ConnectionManager::new(&connector, "AA:BB", policy());
        let mut cancel = CancelToken::disarmed();
        let err = manager
            .establish(None, PhyMode::Auto, &mut cancel)
            .await
            .err()
            .unwrap();
        match err {
            ClientError::ConnectionExhausted { target, attempts } => {
                assert_eq!(target, "AA:BB");
                assert_eq!(attempts.len(), 3);
                assert!(attempts
                    .iter()
                    .all(|a| a.outcome == AttemptOutcome::Timeout));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_retry_delay() {
        let connector = Flaky {
            failures: 10,
            seen: AtomicU32::new(0),
        };
        let manager = ConnectionManager::new(
            &connector,
            "AA:BB",
            RetryPolicy {
                attempts: 5,
                timeout: Duration::from_secs(1),
                retry_delay: Duration::from_secs(3600),
            },
        );
        let (handle, mut cancel) = crate::client::cancel::cancel_pair();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });
        let err = manager
            .establish(None, PhyMode::Auto, &mut cancel)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ClientError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_negotiation_downgrades_to_warnings() {
        struct Constrained;
        impl Connector for Constrained {
            async fn connect(&self, _timeout: Duration) -> LinkResult<LinkHandle> {
                Ok(bare_link(LinkCaps {
                    max_mtu: Some(185),
                    phy_switch: false,
                }))
            }
        }
        let connector = Constrained;
        let manager = ConnectionManager::new(&connector, "AA:BB", policy());
        let mut cancel = CancelToken::disarmed();
        let managed = manager
            .establish(Some(247), PhyMode::TwoM, &mut cancel)
            .await
            .unwrap();
        assert_eq!(managed.negotiation.mtu, NegotiationStatus::Success);
        assert_eq!(managed.negotiation.granted_mtu, Some(185));
        assert_eq!(managed.negotiation.phy, NegotiationStatus::Unsupported);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_phy_skips_negotiation() {
        let connector = Flaky {
            failures: 0,
            seen: AtomicU32::new(0),
        };
        let manager = ConnectionManager::new(&connector, "AA:BB", policy());
        let mut cancel = CancelToken::disarmed();
        let managed = manager
            .establish(None, PhyMode::Auto, &mut cancel)
            .await
            .unwrap();
        assert_eq!(managed.negotiation.mtu, NegotiationStatus::Skipped);
        assert_eq!(managed.negotiation.phy, NegotiationStatus::Skipped);
    }
}
