pub mod dice;
pub mod error;
pub mod profile;

pub use dice::{DecisionSource, RngSource, ScriptedSource};
pub use error::{ConfigError, ConfigResult};
pub use profile::{FaultOverrides, FaultProfile};
