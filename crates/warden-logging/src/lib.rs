//! # warden-logging
//!
//! Structured logging with `tracing` and optional `SQLite` persistence.
//!
//! - [`init_subscriber`]: compact stderr output with an `EnvFilter`
//! - [`init_subscriber_with_sqlite`]: the same, plus [`SqliteTransport`]
//! - [`LogStore`]: querying persisted rows by level, community, member and time
//!
//! Context such as the community and member under enforcement is carried on
//! `tracing` spans, not passed to each log call.

#![deny(unsafe_code)]

pub mod store;
pub mod transport;
pub mod types;

pub use store::LogStore;
pub use transport::{SqliteTransport, TransportConfig, TransportHandle, ensure_schema};
pub use types::{LogEntry, LogLevel, LogQueryOptions};

use tracing_subscriber::EnvFilter;

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber with stderr output only.
///
/// `RUST_LOG` overrides `level`. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Install the global subscriber with stderr output and `SQLite` persistence.
///
/// Rows at or above `level` are persisted. Returns a [`TransportHandle`] for
/// periodic and final flushing.
pub fn init_subscriber_with_sqlite(
    level: &str,
    conn: rusqlite::Connection,
) -> rusqlite::Result<TransportHandle> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let config = TransportConfig {
        min_level: LogLevel::from_str_lossy(level),
        ..TransportConfig::default()
    };
    let transport = SqliteTransport::new(conn, config)?;
    let handle = transport.handle();

    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt_layer)
        .with(transport)
        .try_init();

    Ok(handle)
}

/// Spawn a task that flushes the transport on its configured interval.
///
/// Abort it on shutdown after a final [`TransportHandle::flush`].
pub fn spawn_flush_task(handle: TransportHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(handle.flush_interval());
        loop {
            let _ = interval.tick().await;
            handle.flush();
        }
    })
}
