//! # Fallback Buffer
//!
//! Local durable log that receives every reading the primary store cannot
//! take. One CSV file per calendar day:
//!
//! ```text
//! <buffer_dir>/dataBuffer_20250314.csv
//! DATA_VALUE,TIME_COUNT,ID_LOGS,NOTE
//! 1.99,4210,12,Fallback mode ON
//! -1,0,12,Malformed or unreadable data
//! ```
//!
//! The buffer is append-only: nothing here reads, rewrites or deletes a
//! line. Appends from every caller go through one lock so lines never
//! interleave, and the header is written exactly once per file, ahead of
//! that day's first record.
//!
//! A failed append is the only place the pipeline genuinely loses data. It
//! is returned to the caller and also logged at `error` on the
//! [`DATA_LOSS_TARGET`] target, separate from every other failure kind.

mod error;

pub use error::{BufferError, BufferResult};

use bridge_config_and_utils::BufferedRecord;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Header row written once at the top of every day file.
pub const HEADER: &str = "DATA_VALUE,TIME_COUNT,ID_LOGS,NOTE";
/// Day file name prefix.
pub const FILE_PREFIX: &str = "dataBuffer_";
/// Day file extension.
pub const FILE_EXTENSION: &str = "csv";
/// Tracing target for records that could not be buffered.
pub const DATA_LOSS_TARGET: &str = "fallback_buffer::data_loss";

/// Append-only, day-partitioned CSV buffer.
#[derive(Debug)]
pub struct FallbackBuffer {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FallbackBuffer {
    /// Create a buffer rooted at `dir`. The directory is created lazily on
    /// the first append.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the day files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Day file for `date`.
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            FILE_PREFIX,
            date.format("%Y%m%d"),
            FILE_EXTENSION
        ))
    }

    /// Append a record to today's file (local calendar date).
    ///
    /// Returns the file the record landed in.
    pub fn append(&self, record: &BufferedRecord) -> BufferResult<PathBuf> {
        self.append_on(Local::now().date_naive(), record)
    }

    /// Append a record to the file for `date`.
    pub fn append_on(&self, date: NaiveDate, record: &BufferedRecord) -> BufferResult<PathBuf> {
        let path = self.file_for(date);

        match self.write_record(&path, record) {
            Ok(()) => {
                info!(
                    path = %path.display(),
                    session_id = record.session_column(),
                    note = %record.note,
                    "Record saved to fallback buffer"
                );
                Ok(path)
            }
            Err(source) => {
                error!(
                    target: DATA_LOSS_TARGET,
                    path = %path.display(),
                    value = record.value,
                    elapsed_ms = record.elapsed_ms,
                    session_id = record.session_column(),
                    note = %record.note,
                    error = %source,
                    "Reading lost: fallback buffer append failed"
                );
                Err(BufferError::Io { path, source })
            }
        }
    }

    fn write_record(&self, path: &Path, record: &BufferedRecord) -> std::io::Result<()> {
        let _guard = self.write_lock.lock();

        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        let mut chunk = String::new();
        if file.metadata()?.len() == 0 {
            chunk.push_str(HEADER);
            chunk.push('\n');
        }
        chunk.push_str(&format_line(record));
        chunk.push('\n');

        // One write per record keeps each line whole even if another
        // process appends to the same file.
        file.write_all(chunk.as_bytes())?;
        file.flush()
    }
}

/// CSV line for a record, without the trailing newline.
pub fn format_line(record: &BufferedRecord) -> String {
    format!(
        "{},{},{},{}",
        record.value_column(),
        record.elapsed_ms,
        record.session_column(),
        record.note
    )
}
