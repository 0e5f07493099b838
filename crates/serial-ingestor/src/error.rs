//! Ingestor error types.

use std::path::PathBuf;
use thiserror::Error;

/// Why a line could not be turned into a reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    Empty,

    #[error("expected 2 comma-separated fields, found {0}")]
    MissingField(usize),

    #[error("invalid ADC field: {0:?}")]
    InvalidAdc(String),

    #[error("invalid voltage field: {0:?}")]
    InvalidVoltage(String),
}

/// The device link could not be opened. Fatal for the run.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("cannot open link {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot configure link {path}: {source}")]
    Configure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
}

pub type LinkResult<T> = Result<T, LinkError>;
