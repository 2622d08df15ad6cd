//! `SQLite` write transport for `tracing` events.
//!
//! [`SqliteTransport`] implements [`tracing_subscriber::Layer`] to capture log
//! events and write them to the `logs` table in batched transactions.
//!
//! # Batching
//!
//! - Events are accumulated in an internal buffer.
//! - **Immediate flush** at warn and above.
//! - **Threshold flush** when the batch reaches `batch_size` (default 100).
//! - **Periodic flush** via [`crate::spawn_flush_task`] (default 1 second).
//!
//! # Span context
//!
//! `community_id`, `member_id`, `message_id` and `component` are read from the
//! span stack, innermost span first, so every event logged inside an
//! `enforce` span carries the message it is about.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use crate::types::LogLevel;

/// Create the `logs` table and its indexes if missing.
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            level TEXT NOT NULL,
            level_num INTEGER NOT NULL,
            component TEXT NOT NULL DEFAULT '',
            message TEXT NOT NULL DEFAULT '',
            community_id TEXT,
            member_id TEXT,
            message_id TEXT,
            data TEXT,
            error_message TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_logs_community ON logs(community_id, member_id);",
    )
}

/// Configuration for the `SQLite` transport.
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Minimum level to persist.
    pub min_level: LogLevel,
    /// Number of entries before batch flush.
    pub batch_size: usize,
    /// Flush interval in milliseconds.
    pub flush_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            batch_size: 100,
            flush_interval_ms: 1000,
        }
    }
}

#[derive(Clone, Debug)]
struct PendingEntry {
    timestamp: String,
    level: LogLevel,
    component: String,
    message: String,
    community_id: Option<String>,
    member_id: Option<String>,
    message_id: Option<String>,
    data: Option<String>,
    error_message: Option<String>,
}

struct TransportInner {
    batch: Vec<PendingEntry>,
    conn: Connection,
}

impl TransportInner {
    fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let entries: Vec<PendingEntry> = self.batch.drain(..).collect();
        // A logging failure has nowhere to be logged.
        let _ = write_batch(&self.conn, &entries);
    }
}

/// `SQLite` write transport for the `tracing` subscriber.
pub struct SqliteTransport {
    inner: Arc<Mutex<TransportInner>>,
    config: TransportConfig,
}

impl SqliteTransport {
    /// Create a transport over `conn`, creating the schema if needed.
    pub fn new(conn: Connection, config: TransportConfig) -> rusqlite::Result<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(TransportInner {
                batch: Vec::with_capacity(config.batch_size),
                conn,
            })),
            config,
        })
    }

    /// Get a handle for manual flushing and shutdown.
    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            inner: Arc::clone(&self.inner),
            flush_interval_ms: self.config.flush_interval_ms,
        }
    }
}

/// Handle for flushing from outside the layer.
#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<Mutex<TransportInner>>,
    flush_interval_ms: u64,
}

impl TransportHandle {
    /// Flush any pending entries.
    pub fn flush(&self) {
        self.inner.lock().flush();
    }

    /// Interval for periodic flushing.
    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.flush_interval_ms)
    }

    /// Number of entries waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.inner.lock().batch.len()
    }
}

/// Context fields stored on each span.
#[derive(Clone, Debug, Default)]
struct SpanContext {
    community_id: Option<String>,
    member_id: Option<String>,
    message_id: Option<String>,
    component: Option<String>,
}

impl SpanContext {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "community_id" => self.community_id = Some(value),
            "member_id" => self.member_id = Some(value),
            "message_id" => self.message_id = Some(value),
            "component" => self.component = Some(value),
            _ => {}
        }
    }

    fn fill_from(&mut self, outer: &Self) {
        if self.community_id.is_none() {
            self.community_id.clone_from(&outer.community_id);
        }
        if self.member_id.is_none() {
            self.member_id.clone_from(&outer.member_id);
        }
        if self.message_id.is_none() {
            self.message_id.clone_from(&outer.message_id);
        }
        if self.component.is_none() {
            self.component.clone_from(&outer.component);
        }
    }
}

impl Visit for SpanContext {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field.name(), value.to_string());
    }

    // `%value` and `?value` fields arrive here.
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.set(field.name(), format!("{value:?}"));
    }
}

struct EventFieldVisitor {
    message: Option<String>,
    error_message: Option<String>,
    data: serde_json::Map<String, serde_json::Value>,
}

impl EventFieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            error_message: None,
            data: serde_json::Map::new(),
        }
    }

    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        let _ = self.data.insert(field.name().to_string(), value);
    }
}

impl Visit for EventFieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "error" => self.error_message = Some(value.to_string()),
            _ => self.insert(field, serde_json::Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.insert(field, serde_json::Value::Number(n));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        match field.name() {
            "message" => self.message = Some(text),
            "error" => self.error_message = Some(text),
            _ => self.insert(field, serde_json::Value::String(text)),
        }
    }
}

impl<S> Layer<S> for SqliteTransport
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut span_ctx = SpanContext::default();
        attrs.record(&mut span_ctx);
        span.extensions_mut().insert(span_ctx);
    }

    fn on_record(&self, id: &tracing::span::Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(span_ctx) = extensions.get_mut::<SpanContext>() {
            values.record(span_ctx);
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = LogLevel::from_tracing(event.metadata().level());
        if level < self.config.min_level {
            return;
        }

        let mut span_ctx = SpanContext::default();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(fields) = span.extensions().get::<SpanContext>() {
                    span_ctx.fill_from(fields);
                }
            }
        }

        let mut visitor = EventFieldVisitor::new();
        event.record(&mut visitor);

        let data = if visitor.data.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.data).ok()
        };

        let entry = PendingEntry {
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level,
            component: span_ctx
                .component
                .unwrap_or_else(|| event.metadata().target().to_string()),
            message: visitor.message.unwrap_or_default(),
            community_id: span_ctx.community_id,
            member_id: span_ctx.member_id,
            message_id: span_ctx.message_id,
            data,
            error_message: visitor.error_message,
        };

        let mut inner = self.inner.lock();
        inner.batch.push(entry);
        if level >= LogLevel::Warn || inner.batch.len() >= self.config.batch_size {
            inner.flush();
        }
    }
}

/// Write a batch of entries in a single transaction.
fn write_batch(conn: &Connection, entries: &[PendingEntry]) -> rusqlite::Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO logs (timestamp, level, level_num, component, message, \
             community_id, member_id, message_id, data, error_message) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for entry in entries {
            let _ = stmt.execute(rusqlite::params![
                entry.timestamp,
                entry.level.to_string(),
                entry.level.as_num(),
                entry.component,
                entry.message,
                entry.community_id,
                entry.member_id,
                entry.message_id,
                entry.data,
                entry.error_message,
            ])?;
        }
    }
    tx.commit()
}
