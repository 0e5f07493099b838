//! JSONL records for the bridge log file.
//!
//! One object per event. The fields an operator needs to reconstruct an
//! outage (`session_id`, `attempt`, `outage_ms`) are lifted to the top level;
//! everything else lands in `fields`. Events on the buffer's data-loss
//! target are flagged with `"data_loss": true`.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Target the fallback buffer reports unrecoverable writes on.
pub(crate) const DATA_LOSS_TARGET: &str = "fallback_buffer::data_loss";

/// One line of the log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub service: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outage_ms: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub data_loss: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    fn record(&mut self, name: &str, value: Value) {
        match name {
            "message" => {
                self.message = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                }
            }
            // Session ids are usually logged with `%`, which arrives as text.
            "session_id" => match as_i64(&value) {
                Some(id) => self.session_id = Some(id),
                None => {
                    self.fields.insert(name.to_string(), value);
                }
            },
            "attempt" if value.is_u64() => self.attempt = value.as_u64(),
            "outage_ms" if value.is_u64() => self.outage_ms = value.as_u64(),
            _ => {
                self.fields.insert(name.to_string(), value);
            }
        }
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl Visit for LogEntry {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field.name(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field.name(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record(field.name(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record(field.name(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record(field.name(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.record(field.name(), value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.record(field.name(), Value::String(value.to_string()));
    }
}

/// Layer that appends every event to a writer as one JSON line.
pub struct JsonLayer<W> {
    service: String,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: impl Into<String>, make_writer: W) -> Self {
        Self {
            service: service.into(),
            make_writer,
        }
    }

    fn entry(&self, event: &Event<'_>) -> LogEntry {
        let metadata = event.metadata();
        let mut entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: metadata.level().as_str().to_string(),
            service: self.service.clone(),
            target: metadata.target().to_string(),
            data_loss: metadata.target() == DATA_LOSS_TARGET,
            ..Default::default()
        };
        event.record(&mut entry);
        entry
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let entry = self.entry(event);
        if let Ok(line) = serde_json::to_string(&entry) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{line}");
        }
    }
}
