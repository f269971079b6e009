use crate::client::ClientError;
use crate::fault::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Adapter lock busy: {0}")]
    LockContention(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SweepResult<T> = Result<T, SweepError>;
