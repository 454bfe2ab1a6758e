//! Process-wide tracing subscriber and the optional Prometheus exporter.

use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::str::FromStr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] BuildError),
}

/// Resolves the filter from `RUST_LOG`, falling back to `fallback`.
///
/// # Errors
///
/// [`TelemetryError::Filter`] when neither expression parses.
pub fn resolve_filter(fallback: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .map_err(|err| TelemetryError::Filter(err.to_string()))
}

/// Installs the global `fmt` subscriber, writing to stderr.
///
/// # Errors
///
/// Fails on a bad filter or when a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<(), TelemetryError> {
    let filter = resolve_filter(DEFAULT_FILTER)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Text => Box::new(builder.finish()),
    };
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Serves `/metrics` in Prometheus text format on `addr` and installs the
/// global `metrics` recorder.
///
/// # Errors
///
/// Fails when the listener cannot be set up or a recorder is already installed.
pub fn install_metrics_exporter(addr: SocketAddr) -> Result<(), TelemetryError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    Ok(())
}
