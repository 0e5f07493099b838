//! # Serial Ingestor
//!
//! Owns the device link and turns each framed line into an [`Ingested`]
//! item on the router queue.
//!
//! - [`open_link`] opens the device (or stdin) with 9600 8N1 settings
//! - [`AcquisitionClock`] stamps readings with milliseconds since the link opened
//! - [`SerialIngestor`] reads lines and forwards readings and malformed lines alike
//!
//! Parsing never fails past [`SerialIngestor::on_line`]. Store I/O happens on
//! the router's worker, so a slow store never delays the next line.
//!
//! [`Ingested`]: bridge_config_and_utils::Ingested

mod clock;
mod error;
mod ingestor;
mod link;
mod parse;

pub use clock::AcquisitionClock;
pub use error::{LinkError, LinkResult, ParseError};
pub use ingestor::{IngestEnd, IngestSummary, SerialIngestor};
pub use link::{open_link, Link, LinkSettings, STDIN_PORT};
pub use parse::{parse_line, ParsedLine};
