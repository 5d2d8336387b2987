//! Smokeprobe Binary Entry Point
//!
//! Probes the configured hosts and serves the results for scraping.
//! Core functionality is provided by the `smokeprobe` library crate.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use smokeprobe::{
    config::{AppConfig, ConfigError, parse_duration},
    metrics::{Exposition, ProbeMetrics},
    probe::{IcmpConnector, ProbeSupervisor},
    server::{AppState, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit status for runtime failures after configuration succeeded.
const EXIT_RUNTIME_FAILURE: u8 = 1;

/// Smokeprobe - ICMP latency prober with a Prometheus endpoint
#[derive(Parser, Debug)]
#[command(name = "smokeprobe", version, about, long_about = None)]
struct Cli {
    /// Path to an optional YAML configuration file
    #[arg(short, long, env = "SMOKEPROBE_CONFIG")]
    config: Option<String>,

    /// Address to listen on for the web interface and telemetry
    #[arg(long = "web.listen-address", env = "SMOKEPROBE_LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", env = "SMOKEPROBE_TELEMETRY_PATH")]
    telemetry_path: Option<String>,

    /// Comma-separated histogram bucket upper bounds in seconds
    #[arg(long, env = "SMOKEPROBE_BUCKETS")]
    buckets: Option<String>,

    /// Use raw ICMP sockets (true) or unprivileged datagram sockets (false)
    #[arg(long, env = "SMOKEPROBE_PRIVILEGED")]
    privileged: Option<bool>,

    /// Pause between probes of one host
    #[arg(long = "ping.interval", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Reply timeout
    #[arg(long = "ping.timeout", value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Zero the packet counters this often (cumulative when unset)
    #[arg(long = "ping.reset-period", value_parser = parse_duration)]
    reset_period: Option<Duration>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Hosts to probe
    hosts: Vec<String>,
}

impl Cli {
    /// Load the config file (if any) and apply CLI/env overrides on top.
    fn resolve(self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(addr) = self.listen_address {
            config.web.listen_address = addr;
        }
        if let Some(path) = self.telemetry_path {
            config.web.telemetry_path = path;
        }
        if let Some(buckets) = self.buckets {
            config.buckets = buckets;
        }
        if let Some(privileged) = self.privileged {
            config.ping.privileged = privileged;
        }
        if let Some(interval) = self.interval {
            config.ping.interval = interval;
        }
        if let Some(timeout) = self.timeout {
            config.ping.timeout = timeout;
        }
        if self.reset_period.is_some() {
            config.ping.reset_period = self.reset_period;
        }
        if self.debug {
            config.debug = true;
        }
        config.hosts.extend(self.hosts);

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "debug,smokeprobe=debug"
    } else {
        "info,smokeprobe=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("smokeprobe: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    init_tracing(config.debug);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::from(EXIT_RUNTIME_FAILURE);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            ExitCode::from(EXIT_RUNTIME_FAILURE)
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Smokeprobe - ICMP latency prober");

    // Metrics exist before any probe runs so the first scrape is valid.
    let metrics = Arc::new(ProbeMetrics::new(config.histogram_buckets()?));
    let exposition = Arc::new(Exposition::new(Arc::clone(&metrics))?);

    let targets = config.targets();
    if targets.is_empty() {
        tracing::warn!("No hosts configured, serving an empty exposition");
    }

    let settings = config.probe_settings();
    tracing::info!(
        hosts = targets.len(),
        interval = ?settings.interval,
        timeout = ?settings.timeout,
        counters = %settings.counter_mode,
        privileged = config.ping.privileged,
        "Probe settings"
    );

    let connector =
        IcmpConnector::new(config.ping.privileged).with_payload_size(config.ping.payload_size);
    let mut supervisor = ProbeSupervisor::new(connector, Arc::clone(&metrics), settings);
    supervisor.spawn_all(targets);

    let app = create_router(AppState::new(exposition, config.web.telemetry_path.clone()));
    let addr = config.listen_address()?;

    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    tracing::info!(
        "Web server listening on: http://{}{}",
        listener.local_addr()?,
        config.web.telemetry_path
    );
    tracing::info!("Press Ctrl+C to shutdown");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("Shutting down probes...");
    supervisor.shutdown().await;

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
