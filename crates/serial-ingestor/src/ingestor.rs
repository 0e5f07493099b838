//! Line producer.

use crate::{parse_line, AcquisitionClock};
use bridge_config_and_utils::{Ingested, Reading};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Why [`SerialIngestor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestEnd {
    /// Stop was signalled.
    Stopped,
    /// The link reached end of stream.
    EndOfStream,
    /// Reading from the link failed.
    ReadError,
    /// The router side of the queue is gone.
    QueueClosed,
}

/// What one run produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub lines: u64,
    pub readings: u64,
    pub malformed: u64,
    pub end: IngestEnd,
}

/// Turns raw link lines into queue items.
pub struct SerialIngestor {
    clock: AcquisitionClock,
    sink: mpsc::Sender<Ingested>,
}

impl SerialIngestor {
    pub fn new(clock: AcquisitionClock, sink: mpsc::Sender<Ingested>) -> Self {
        Self { clock, sink }
    }

    /// Convert one raw line. Never fails: unparseable input becomes
    /// [`Ingested::Malformed`].
    pub fn on_line(&self, raw: &str) -> Ingested {
        let elapsed_ms = self.clock.elapsed_ms();
        debug!(raw, elapsed_ms, "Received line");

        match parse_line(raw) {
            Ok(parsed) => {
                debug!(adc = parsed.adc, voltage = parsed.voltage, elapsed_ms, "Parsed reading");
                Ingested::Reading(Reading::new(parsed.voltage, elapsed_ms).with_scale(parsed.scale))
            }
            Err(e) => Ingested::Malformed {
                raw: raw.to_string(),
                reason: e.to_string(),
            },
        }
    }

    /// Read lines until stop is signalled, the link ends or the queue closes.
    pub async fn run<R>(&self, mut reader: R, mut stop: watch::Receiver<bool>) -> IngestSummary
    where
        R: AsyncBufRead + Unpin,
    {
        let mut summary = IngestSummary {
            lines: 0,
            readings: 0,
            malformed: 0,
            end: IngestEnd::Stopped,
        };
        let mut buf = Vec::new();

        loop {
            if *stop.borrow_and_update() {
                summary.end = IngestEnd::Stopped;
                break;
            }

            buf.clear();
            let read = tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        summary.end = IngestEnd::Stopped;
                        break;
                    }
                    continue;
                }
                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    summary.end = IngestEnd::EndOfStream;
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Link read failed; stopping ingestion");
                    summary.end = IngestEnd::ReadError;
                    break;
                }
            }

            let text = String::from_utf8_lossy(&buf);
            let line = text.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            summary.lines += 1;
            let item = self.on_line(line);
            match &item {
                Ingested::Reading(_) => summary.readings += 1,
                Ingested::Malformed { .. } => summary.malformed += 1,
            }

            if self.sink.send(item).await.is_err() {
                warn!("Router queue closed; stopping ingestion");
                summary.end = IngestEnd::QueueClosed;
                break;
            }
        }

        info!(
            lines = summary.lines,
            readings = summary.readings,
            malformed = summary.malformed,
            end = ?summary.end,
            "Ingestion stopped"
        );
        summary
    }
}
