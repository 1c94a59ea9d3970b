//! beacond: field-operations offline sync daemon
//!
//! Usage:
//!   beacond [--config /etc/beacon/config.toml] [--log info] [--log-format text|json]
//!
//! Keeps a durable queue of field mutations and replays it against the
//! backend API whenever the connectivity probe reports the backend reachable.

mod api;
mod daemon;
mod metrics;
mod probe;
mod remote;

use anyhow::{Context, Result};
use beacon_core::config::BeaconConfig;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "beacond", version, about = "Beacon offline sync daemon")]
struct Cli {
    /// Path to the beacon configuration file
    #[arg(
        long,
        short = 'c',
        env = "BEACON_CONFIG",
        default_value = "/etc/beacon/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "BEACON_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides the config file
    #[arg(long, env = "BEACON_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config first so its log settings apply; a missing file is only reported
    // once logging is up.
    let (config, found) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.daemon.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    if !found {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "beacond starting"
    );

    daemon::run(config).await
}

async fn load_config(path: &Path) -> Result<(BeaconConfig, bool)> {
    if !path.exists() {
        return Ok((BeaconConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok((config, true))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
