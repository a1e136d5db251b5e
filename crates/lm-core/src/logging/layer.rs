//! Custom tracing layer for JSONL output.
//!
//! One JSON object per event. stdout stays clean for the result payload.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

const REDACTED: &str = "[REDACTED]";

/// Field names whose values never reach the log.
fn is_sensitive(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["password", "secret", "token"]
        .iter()
        .any(|needle| name.contains(needle))
}

/// Correlation fields captured from spans.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    run_id: Option<String>,
    stage: Option<String>,
    component: Option<String>,
}

impl SpanContext {
    /// Take fields from an enclosing span where this one has none. Walking
    /// the scope innermost-first makes the nearest span win.
    fn fill_from(&mut self, outer: &SpanContext) {
        if self.run_id.is_none() {
            self.run_id.clone_from(&outer.run_id);
        }
        if self.stage.is_none() {
            self.stage.clone_from(&outer.stage);
        }
        if self.component.is_none() {
            self.component.clone_from(&outer.component);
        }
    }
}

struct JsonFieldVisitor {
    fields: serde_json::Map<String, Value>,
    message: Option<String>,
}

impl JsonFieldVisitor {
    fn new() -> Self {
        JsonFieldVisitor {
            fields: serde_json::Map::new(),
            message: None,
        }
    }

    fn insert_str(&mut self, name: &str, value: String) {
        if name == "message" {
            self.message = Some(value);
        } else if is_sensitive(name) {
            self.fields
                .insert(name.to_string(), Value::String(REDACTED.into()));
        } else {
            self.fields
                .insert(name.to_string(), Value::String(value));
        }
    }
}

impl tracing::field::Visit for JsonFieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.insert_str(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.insert_str(field.name(), format!("{:?}", value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            Value::Number(value.into()),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            Value::Number(value.into()),
        );
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), Value::Bool(value));
    }
}

struct SpanContextVisitor {
    context: SpanContext,
}

impl tracing::field::Visit for SpanContextVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "run_id" => self.context.run_id = Some(value.to_string()),
            "stage" => self.context.stage = Some(value.to_string()),
            "component" => self.context.component = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        // `%value` fields arrive here already formatted with Display.
        self.record_str(field, &format!("{:?}", value));
    }
}

/// JSONL tracing layer.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    /// Create a new JSONL layer writing to stderr.
    pub fn stderr() -> Self {
        JsonlLayer {
            writer: Mutex::new(io::stderr()),
        }
    }
}

impl<W: Write> JsonlLayer<W> {
    /// Create a new JSONL layer with a custom writer.
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = SpanContextVisitor {
            context: SpanContext::default(),
        };
        attrs.record(&mut visitor);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(visitor.context);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut merged = SpanContext::default();
        for span in ctx.event_scope(event).into_iter().flatten() {
            if let Some(outer) = span.extensions().get::<SpanContext>() {
                merged.fill_from(outer);
            }
        }

        let mut visitor = JsonFieldVisitor::new();
        event.record(&mut visitor);

        let level: Level = (*event.metadata().level()).into();
        let mut line = json!({
            "ts": Utc::now().to_rfc3339(),
            "level": level,
            "event": event.metadata().target(),
        });
        let optional = [
            ("run_id", merged.run_id),
            ("stage", merged.stage),
            ("component", merged.component),
            ("message", visitor.message),
        ];
        if let Value::Object(obj) = &mut line {
            for (key, value) in optional {
                if let Some(value) = value {
                    obj.insert(key.to_string(), Value::String(value));
                }
            }
            if !visitor.fields.is_empty() {
                obj.insert("fields".to_string(), Value::Object(visitor.fields));
            }
        }

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
        }
    }
}
