use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Connection refused: {0}")]
    Refused(String),

    #[error("Link closed: {0}")]
    Closed(String),

    #[error("Capability not supported: {0}")]
    Unsupported(&'static str),
}

/// Malformed or unknown traffic on the wire. The transport is
/// fire-and-forget, so these are logged locally and never sent back.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown command opcode 0x{0:02X}")]
    UnknownOpcode(u8),

    #[error("Empty command frame")]
    EmptyCommand,

    #[error("Command {0} not valid in state {1}")]
    InvalidTransition(&'static str, &'static str),
}

pub type LinkResult<T> = Result<T, LinkError>;
