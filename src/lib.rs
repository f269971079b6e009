//! ringbench: a BLE GATT throughput-test lab that runs end to end in
//! process. A simulated peripheral streams sequence-numbered
//! notifications through a configurable fault pipeline; the client
//! measures throughput, latency, and RSSI; the orchestrator sweeps the
//! scenario matrix into CSV tables and a run manifest.

pub mod client;
pub mod fault;
pub mod link;
pub mod orchestrator;
pub mod peripheral;

pub use client::{CancelToken, ConnectionManager, MetricsEngine, RetryPolicy};
pub use fault::{FaultOverrides, FaultProfile};
pub use link::{Command, Connector, LinkHandle, PhyMode};
pub use orchestrator::{SweepConfig, SweepReport, SweepRunner};
pub use peripheral::{MockPeripheral, PeripheralConfig};
