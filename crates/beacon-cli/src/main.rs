//! beacon: operator CLI for the beacond offline queue
//!
//! Commands:
//!   status              - daemon version, connectivity, pending count
//!   queue list [--json] - pending actions in FIFO order
//!   queue clear --yes   - drop every pending action
//!   sync                - force a drain now (no-op while offline)
//!   config show         - display the configuration

mod client;

use anyhow::{Context, Result};
use beacon_core::config::BeaconConfig;
use beacon_core::PendingAction;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::client::DaemonClient;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "beacon",
    version,
    about = "Beacon offline queue client",
    long_about = "beacon: inspect and control the beacond offline action queue"
)]
struct Cli {
    /// Path to the beacon configuration file
    #[arg(long, short = 'c', env = "BEACON_CONFIG", default_value = "/etc/beacon/config.toml")]
    config: PathBuf,

    /// beacond API base URL (default: http://{daemon.listen} from the config)
    #[arg(long, env = "BEACON_DAEMON_URL")]
    daemon_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show daemon status
    Status,

    /// Inspect or reset the offline queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Drain the queue now
    Sync,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum QueueAction {
    /// List pending actions
    List {
        /// Print the raw JSON records
        #[arg(long)]
        json: bool,
    },
    /// Drop every pending action, of every kind
    Clear {
        /// Confirm; nothing is cleared without it
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the configuration (local file, or the daemon's with --effective)
    Show {
        /// Ask the running daemon for the configuration it loaded
        #[arg(long)]
        effective: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;
    let daemon_url = cli
        .daemon_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", config.daemon.listen));

    match cli.command {
        Commands::Status => cmd_status(&DaemonClient::new(&daemon_url)?).await,
        Commands::Queue { action: QueueAction::List { json } } => {
            cmd_queue_list(&DaemonClient::new(&daemon_url)?, json).await
        }
        Commands::Queue { action: QueueAction::Clear { yes } } => {
            cmd_queue_clear(&DaemonClient::new(&daemon_url)?, yes).await
        }
        Commands::Sync => cmd_sync(&DaemonClient::new(&daemon_url)?).await,
        Commands::Config { action: ConfigAction::Show { effective: false } } => {
            cmd_config_show(&config, &cli.config)
        }
        Commands::Config { action: ConfigAction::Show { effective: true } } => {
            let client = DaemonClient::new(&daemon_url)?;
            let remote = client.config().await?;
            println!("# Configuration loaded by beacond at {}", client.base());
            println!();
            print!("{}", toml::to_string_pretty(&remote).context("serializing config to TOML")?);
            Ok(())
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<BeaconConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(BeaconConfig::default())
    }
}

// ── `beacon status` ───────────────────────────────────────────────────────────

async fn cmd_status(client: &DaemonClient) -> Result<()> {
    let status = client.status().await?;
    println!("beacond v{}", status.version);
    println!("  api:          {}", client.base());
    println!(
        "  connectivity: {}",
        if status.online { "online" } else { "OFFLINE" }
    );
    println!("  pending:      {}", status.pending);
    Ok(())
}

// ── `beacon queue` ────────────────────────────────────────────────────────────

async fn cmd_queue_list(client: &DaemonClient, json: bool) -> Result<()> {
    let actions = client.list().await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&actions).context("serializing actions")?
        );
        return Ok(());
    }
    if actions.is_empty() {
        println!("queue is empty");
        return Ok(());
    }
    for line in render_table(&actions) {
        println!("{line}");
    }
    Ok(())
}

fn render_table(actions: &[PendingAction]) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<36}  {:<16}  {:>7}  {}",
        "ID", "KIND", "RETRIES", "ENQUEUED"
    )];
    lines.extend(actions.iter().map(|a| {
        format!(
            "{:<36}  {:<16}  {:>7}  {}",
            a.id,
            a.kind().as_str(),
            format!("{}/{}", a.retry_count, a.max_retries),
            a.enqueued_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }));
    lines
}

async fn cmd_queue_clear(client: &DaemonClient, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("refusing to clear the queue without --yes (pending actions are lost for good)");
    }
    let cleared = client.clear().await?;
    println!("cleared {cleared} pending action(s)");
    Ok(())
}

// ── `beacon sync` ─────────────────────────────────────────────────────────────

async fn cmd_sync(client: &DaemonClient) -> Result<()> {
    let outcome = client.sync().await?;
    if !outcome.online {
        println!("offline: nothing sent, {} action(s) still pending", outcome.pending);
    } else if !outcome.finished {
        println!("sync still running in beacond, {} action(s) pending so far", outcome.pending);
    } else {
        println!("sync done, {} action(s) still pending", outcome.pending);
    }
    Ok(())
}

// ── `beacon config show` ──────────────────────────────────────────────────────

fn cmd_config_show(config: &BeaconConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::{ActionPayload, ChatMessage};
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_queue_clear() {
        let cli = Cli::try_parse_from(["beacon", "queue", "clear", "--yes"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Queue { action: QueueAction::Clear { yes: true } }
        ));
    }

    #[test]
    fn table_has_one_row_per_action() {
        let action = PendingAction::new(
            ActionPayload::MessageSend(ChatMessage {
                conversation_id: "c".into(),
                sender_id: "s".into(),
                body: "b".into(),
                sent_at: chrono::Utc::now(),
            }),
            3,
        );
        let lines = render_table(&[action.clone()]);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with(action.id.as_str()));
        assert!(lines[1].contains("message_send"));
        assert!(lines[1].contains("0/3"));
    }
}
