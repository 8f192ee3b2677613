use std::io;
use std::time::Duration;

use thiserror::Error;

/// Why a dial attempt did not produce a connection.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection refused")]
    Refused,
    #[error("network error: {0}")]
    Network(String),
}

impl ProbeError {
    /// Map an OS-level connect error onto the taxonomy.
    pub fn from_io(err: &io::Error, deadline: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => ProbeError::Timeout(deadline),
            io::ErrorKind::ConnectionRefused => ProbeError::Refused,
            _ => ProbeError::Network(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sink rejected write with status {0}")]
    Status(u16),
}
