//! Measurement client: connection management with retries, the three
//! trial drivers (throughput, latency, RSSI), and raw log emission.

pub mod cancel;
pub mod connection;
pub mod error;
pub mod latency;
pub mod logs;
pub mod metrics;
pub mod rssi;
pub mod throughput;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use connection::{
    AttemptOutcome, ConnectionAttempt, ConnectionManager, ManagedLink, NegotiationReport,
    RetryPolicy,
};
pub use error::{ClientError, ClientResult};
pub use latency::{run_latency, LatencyConfig, LatencyMode, LatencyOutcome, LatencySummary};
pub use logs::RawLogs;
pub use metrics::{MetricsEngine, PacketRecord, ThroughputSummary};
pub use rssi::{run_rssi, RssiConfig, RssiOutcome, RssiSample};
pub use throughput::{run_throughput, ThroughputConfig, ThroughputOutcome};
