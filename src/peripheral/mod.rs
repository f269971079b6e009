//! In-process simulated peripheral: command state machine, fault-shaped
//! notification stream, synthesized RSSI.

pub mod rssi;
pub mod scheduler;
pub mod session;

pub use rssi::RssiSynth;
pub use scheduler::{Emission, NotificationScheduler, SchedulerCounters, SchedulerState, Tick};
pub use session::{MockPeripheral, PeripheralConfig};
