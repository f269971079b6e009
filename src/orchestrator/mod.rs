//! Trial orchestration: adapter locking, the sweep matrix, resume, and
//! aggregate outputs (CSV tables plus a per-run JSON manifest).

pub mod error;
pub mod lock;
pub mod manifest;
pub mod runner;
pub mod table;
pub mod types;

pub use error::{SweepError, SweepResult};
pub use lock::AdapterLock;
pub use manifest::{ManifestArgs, ManifestOutputs, RunManifest};
pub use runner::{SweepConfig, SweepReport, SweepRunner};
pub use table::{append_row, CompletedIndex};
pub use types::{LatencyRow, RssiRow, ScenarioSummary, ThroughputRow, TrialKey};
