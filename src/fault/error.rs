use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown fault profile: {0}")]
    UnknownProfile(String),

    #[error("{field} must be within [0, 100], got {value}")]
    PercentOutOfRange { field: &'static str, value: f64 },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
