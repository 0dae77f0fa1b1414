//! `tracing` layer that writes channel-targeted events as JSON lines.

use crate::channels::ChannelLogs;
use medledger_core::types::time::{format_timestamp, now};
use medledger_core::LogChannel;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Routes events whose target starts with a channel target
/// (`medledger::access`, ...) into that channel's file. Other events are
/// ignored.
#[derive(Clone)]
pub struct ChannelLayer {
    logs: Arc<ChannelLogs>,
}

impl ChannelLayer {
    pub fn new(logs: Arc<ChannelLogs>) -> Self {
        Self { logs }
    }

    pub fn logs(&self) -> &Arc<ChannelLogs> {
        &self.logs
    }
}

struct JsonVisitor<'a> {
    fields: &'a mut Map<String, Value>,
}

impl<'a> Visit for JsonVisitor<'a> {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::from(format!("{:?}", value)));
    }
}

impl<S> Layer<S> for ChannelLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let Some(channel) = LogChannel::from_target(metadata.target()) else {
            return;
        };

        let mut fields = Map::new();
        event.record(&mut JsonVisitor {
            fields: &mut fields,
        });

        let mut line = Map::new();
        line.insert("timestamp".into(), Value::from(format_timestamp(&now())));
        line.insert("level".into(), Value::from(metadata.level().as_str()));
        line.insert("channel".into(), Value::from(channel.name()));
        line.insert("target".into(), Value::from(metadata.target()));
        if let Some(message) = fields.remove("message") {
            line.insert("message".into(), message);
        }
        if !fields.is_empty() {
            line.insert("fields".into(), Value::Object(fields));
        }

        // Logging here would re-enter this layer.
        if let Err(e) = self.logs.write_line(channel, &Value::Object(line).to_string()) {
            eprintln!("Warning: Failed to write {} log line: {}", channel, e);
        }
    }
}
