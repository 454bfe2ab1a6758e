//! `opencall-server`: the reference Todo API over the `OpenCALL` protocol.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use opencall_core::SystemClock;
use opencall_server::network::{NetworkConfig, NetworkModule, DEFAULT_MAX_BODY_BYTES};
use opencall_server::service::{DispatchConfig, IdempotencyScope, TokioScheduler};
use opencall_server::telemetry::{self, LogFormat};
use opencall_server::Services;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScopeArg {
    PerOperation,
    Global,
}

impl From<ScopeArg> for IdempotencyScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::PerOperation => Self::PerOperation,
            ScopeArg::Global => Self::Global,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "opencall-server", version, about)]
struct Cli {
    #[arg(long, env = "OPENCALL_HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "OPENCALL_PORT", default_value_t = 3000)]
    port: u16,

    /// Comma-separated allowed origins; `*` allows any.
    #[arg(long, env = "OPENCALL_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,

    #[arg(long, env = "OPENCALL_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Mount `POST /_internal/tokens` (test harnesses only).
    #[arg(long, env = "OPENCALL_EXPOSE_TOKEN_ENDPOINT")]
    expose_token_endpoint: bool,

    /// Sweep expired instances and sessions every N seconds. Off when unset.
    #[arg(long, env = "OPENCALL_SWEEP_INTERVAL_SECS")]
    sweep_interval_secs: Option<u64>,

    #[arg(long, env = "OPENCALL_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "OPENCALL_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[arg(long, env = "OPENCALL_RETRY_AFTER_MS", default_value_t = 100)]
    retry_after_ms: u64,

    #[arg(long, env = "OPENCALL_INSTANCE_TTL_SECS", default_value_t = 3600)]
    instance_ttl_secs: u64,

    #[arg(long, env = "OPENCALL_STAGE_DELAY_MS", default_value_t = 50)]
    stage_delay_ms: u64,

    #[arg(long, env = "OPENCALL_CHUNK_SIZE", default_value_t = opencall_core::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    #[arg(long, env = "OPENCALL_IDEMPOTENCY_SCOPE", value_enum, default_value = "per-operation")]
    idempotency_scope: ScopeArg,
}

impl Cli {
    fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            retry_after_ms: self.retry_after_ms,
            instance_ttl: Duration::from_secs(self.instance_ttl_secs),
            async_stage_delay: Duration::from_millis(self.stage_delay_ms),
            chunk_size: self.chunk_size.max(1),
            idempotency_scope: self.idempotency_scope.into(),
            ..DispatchConfig::default()
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            max_body_bytes: self.max_body_bytes,
            expose_token_endpoint: self.expose_token_endpoint,
            expiry_sweep_interval: self
                .sweep_interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable; shutting down");
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format)?;

    if let Some(addr) = cli.metrics_addr {
        telemetry::install_metrics_exporter(addr)?;
        info!(%addr, "prometheus exporter listening");
    }

    let services = Services::build(
        cli.dispatch_config(),
        Arc::new(TokioScheduler::current()?),
        Arc::new(SystemClock),
    )
    .context("building operation registry")?;
    info!(operations = services.registry.len(), "registry ready");

    let mut module = NetworkModule::new(cli.network_config(), Arc::new(services));
    let port = module.start().await?;
    info!(port, "opencall-server ready");

    module.serve(shutdown_signal()).await
}
