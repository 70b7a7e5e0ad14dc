//! Observability infrastructure for recast.
//!
//! Structured logging with consistent spans. Every conversion and catalog
//! operation logs through `tracing`; this module wires up the subscriber and
//! provides the span constructors used across crates.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for unattended batch runs).
    Json,
    /// Pretty-printed logs (for operators at a terminal).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `recast_convert=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for catalog operations on one table.
///
/// # Example
///
/// ```rust
/// use recast_core::observability::catalog_span;
///
/// let span = catalog_span("copy_table", "analytics", "events");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn catalog_span(operation: &str, database: &str, table: &str) -> Span {
    tracing::info_span!("catalog", op = operation, database = database, table = table)
}

/// Creates a span for the conversion pipeline of one table.
#[must_use]
pub fn conversion_span(operation: &str, database: &str, table: &str) -> Span {
    tracing::info_span!(
        "conversion",
        op = operation,
        database = database,
        table = table,
    )
}

/// Creates a span for query service calls.
#[must_use]
pub fn query_span(operation: &str, execution_id: &str) -> Span {
    tracing::info_span!("query", op = operation, execution_id = execution_id)
}
