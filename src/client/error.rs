use crate::client::connection::ConnectionAttempt;
use crate::fault::ConfigError;
use crate::link::LinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("All {n} connection attempts to {target} failed", n = attempts.len())]
    ConnectionExhausted {
        target: String,
        attempts: Vec<ConnectionAttempt>,
    },

    #[error("Link lost mid-trial")]
    LinkLost,

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Log write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Log encode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Log encode failed: {0}")]
    Csv(#[from] csv::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
