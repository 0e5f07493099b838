//! Fallback buffer error types.

use std::path::PathBuf;
use thiserror::Error;

/// A buffer append that did not reach the disk.
///
/// This is the one failure in the pipeline that loses a reading.
#[derive(Error, Debug)]
pub enum BufferError {
    /// Creating, opening or writing the day file failed.
    #[error("Buffer write failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias using BufferError.
pub type BufferResult<T> = Result<T, BufferError>;
