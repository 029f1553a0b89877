use clap::{Parser, ValueEnum};
use ferry_client::{ClientConfig, KubeClusterClient};
use ferry_scheduler::{ObservationMode, Scheduler, SchedulerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Watch timeouts at or above this are rejected by the API client
const MAX_WATCH_TIMEOUT_SECS: u64 = 295;

#[derive(Parser)]
#[command(name = "ferry", about = "Least-loaded pod scheduler for Kubernetes")]
struct Cli {
    /// Schedule only pods whose spec.schedulerName equals this
    #[arg(long, env = "FERRY_SCHEDULER_NAME", default_value = "my-scheduler")]
    scheduler_name: String,
    /// How pods are observed
    #[arg(long, env = "FERRY_MODE", value_enum, default_value_t = Mode::Poll)]
    mode: Mode,
    /// Seconds between polling cycles
    #[arg(long, env = "FERRY_INTERVAL", default_value_t = 2.0)]
    interval: f64,
    /// Path to a kubeconfig file. Local kubeconfig or in-cluster credentials are inferred when unset
    #[arg(long, env = "KUBECONFIG_PATH")]
    kubeconfig: Option<PathBuf>,
    /// Server-side timeout of one watch request, in seconds (1 to 294)
    #[arg(long, env = "FERRY_WATCH_TIMEOUT", default_value_t = 60)]
    watch_timeout: u64,
    /// Seconds to wait before reopening a watch
    #[arg(long, env = "FERRY_RECONNECT_DELAY", default_value_t = 5)]
    reconnect_delay: u64,
    /// Timeout for list and bind requests, in seconds
    #[arg(long, env = "FERRY_REQUEST_TIMEOUT", default_value_t = 10)]
    request_timeout: u64,
    #[arg(long, env = "FERRY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// List pods on a fixed interval
    Poll,
    /// Follow a watch stream
    Watch,
}

impl From<Mode> for ObservationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Poll => ObservationMode::Polling,
            Mode::Watch => ObservationMode::Streaming,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format);

    let config = scheduler_config(&cli)?;
    info!(
        scheduler_name = %config.scheduler_name,
        mode = %config.mode,
        "scheduler starting"
    );

    let client_config = ClientConfig {
        kubeconfig: cli.kubeconfig.clone(),
        request_timeout: Duration::from_secs(cli.request_timeout),
    };
    let client = KubeClusterClient::connect(&client_config).await?;

    let token = CancellationToken::new();
    let shutdown_timeout = shutdown_timeout(&cli, &config);

    let mut scheduler = Scheduler::new(Arc::new(client), config);
    let scheduler_token = token.clone();
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.run(scheduler_token).await {
            error!("Scheduler error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;

    info!("Shutting down gracefully...");
    token.cancel();

    // The current cycle or event is allowed to finish
    if tokio::time::timeout(shutdown_timeout, scheduler_handle)
        .await
        .is_err()
    {
        error!("Scheduler did not stop within {:?}", shutdown_timeout);
    }

    info!("Shutdown complete");

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn scheduler_config(cli: &Cli) -> miette::Result<SchedulerConfig> {
    if cli.interval <= 0.0 {
        return Err(miette::miette!(
            "Invalid --interval {}: must be a positive number of seconds",
            cli.interval
        ));
    }
    let poll_interval = Duration::try_from_secs_f64(cli.interval)
        .map_err(|e| miette::miette!("Invalid --interval {}: {}", cli.interval, e))?;

    if cli.watch_timeout == 0 || cli.watch_timeout >= MAX_WATCH_TIMEOUT_SECS {
        return Err(miette::miette!(
            "Invalid --watch-timeout {}: must be between 1 and {} seconds",
            cli.watch_timeout,
            MAX_WATCH_TIMEOUT_SECS - 1
        ));
    }

    Ok(SchedulerConfig {
        scheduler_name: cli.scheduler_name.clone(),
        mode: cli.mode.into(),
        poll_interval,
        watch_timeout: Duration::from_secs(cli.watch_timeout),
        reconnect_delay: Duration::from_secs(cli.reconnect_delay),
        ..Default::default()
    })
}

/// How long to wait for the scheduler after cancelling it
///
/// Covers one list or bind request plus the inline bind retry.
fn shutdown_timeout(cli: &Cli, config: &SchedulerConfig) -> Duration {
    Duration::from_secs(cli.request_timeout) * 2 + config.bind_retry_pause
}
