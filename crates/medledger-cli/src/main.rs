//! Medledger CLI - administrative commands for a medledger data directory

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use medledger::{ChannelLayer, ChannelLogs, LedgerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "medledger")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// JSON configuration file (overrides --data-dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Also write channel log files under the configured log directory
    #[arg(long)]
    channel_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new ledger owned by OWNER
    Init {
        #[arg(long)]
        owner: String,

        /// Replace an existing container (the old file is kept as .bak)
        #[arg(long)]
        force: bool,
    },

    /// Check the container layout without opening it for writing
    Validate,

    /// Record counts and file facts
    Stats,

    /// Container ownership
    #[command(subcommand)]
    Identity(IdentityCommands),

    /// Audit log inspection and retention
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Daily manifest chain
    #[command(subcommand)]
    Manifest(ManifestCommands),

    /// Channel log rotation and retention
    #[command(subcommand)]
    Logs(LogsCommands),
}

#[derive(Subcommand)]
pub(crate) enum IdentityCommands {
    /// Write the identity of a container that has none
    Add {
        #[arg(long)]
        owner: String,
    },

    /// Check that OWNER owns the container
    Verify {
        #[arg(long)]
        owner: String,
    },

    /// Print the stored identity
    Show,
}

#[derive(Subcommand)]
pub(crate) enum AuditCommands {
    /// Newest audit events first
    List {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        operation: Option<String>,

        #[arg(long)]
        actor: Option<String>,
    },

    /// Remove audit rows older than the retention window
    #[command(group(ArgGroup::new("mode").required(true).args(["dry_run", "execute"])))]
    Cleanup {
        /// Retention window in days (default: configured retention)
        #[arg(long)]
        days: Option<u32>,

        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,

        /// Remove the rows
        #[arg(long)]
        execute: bool,
    },

    /// Retention report
    Stats {
        #[arg(long)]
        days: Option<u32>,
    },

    /// Events between two dates (inclusive) as JSON lines
    Export {
        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,
    },
}

#[derive(Subcommand)]
pub(crate) enum ManifestCommands {
    /// Manifest one day's audit events (default: yesterday)
    Create {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Verify the chain over an inclusive date range
    Verify {
        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// List stored manifests
    List {
        #[arg(long)]
        start: Option<NaiveDate>,

        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
pub(crate) enum LogsCommands {
    /// Rotate channels whose live file is from a prior day or too large
    Rotate {
        /// Rotate every channel regardless
        #[arg(long)]
        all: bool,
    },

    /// Apply per-channel retention (access logs are archived, never deleted)
    Cleanup,
}

impl Cli {
    fn ledger_config(&self) -> Result<LedgerConfig> {
        match &self.config {
            Some(path) => LedgerConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display())),
            None => Ok(LedgerConfig::new(&self.data_dir)),
        }
    }
}

fn init_logging(cli: &Cli, config: &LedgerConfig) -> Result<()> {
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let channel_layer = if cli.channel_logs {
        let logs = ChannelLogs::open(config.logs.clone()).context("Failed to open channel logs")?;
        Some(ChannelLayer::new(Arc::new(logs)))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(channel_layer)
        .init();
    Ok(())
}

/// `Ok(true)` on success, `Ok(false)` when an integrity check failed
fn run(config: LedgerConfig, command: Commands) -> Result<bool> {
    tracing::debug!(path = %config.container.path.display(), "Using container");

    match command {
        Commands::Init { owner, force } => commands::container::init(config, &owner, force),
        Commands::Validate => commands::container::validate(&config),
        Commands::Stats => commands::container::stats(config),
        Commands::Identity(cmd) => commands::identity::execute(config, cmd),
        Commands::Audit(cmd) => commands::audit::execute(config, cmd),
        Commands::Manifest(cmd) => commands::manifest::execute(config, cmd),
        Commands::Logs(cmd) => commands::logs::execute(config, cmd),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = cli.ledger_config().and_then(|config| {
        init_logging(&cli, &config)?;
        run(config, cli.command)
    });
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
