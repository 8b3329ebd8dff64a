//! LURKER - early token signal scanner
//!
//! Polls DexScreener (and optionally factory logs), keeps an address-keyed
//! signal store, classifies it into tier feeds, enriches and gates the
//! results, and pushes alerts to Telegram.
//!
//! # NOTE
//! - Signals are informational. Nothing here is trading advice.
//! - Most fresh tokens go to zero.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lurker::cli::commands;
use lurker::config::Config;

/// LURKER - early token signal scanner
#[derive(Parser)]
#[command(name = "lurker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "lurker.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run collectors, classifier, enrichment and notifier until Ctrl+C
    Run,

    /// Run a single collection cycle
    Collect {
        /// Only run the collector with this name
        #[arg(long)]
        name: Option<String>,
    },

    /// Classify the store and write tier feeds
    Classify,

    /// Enrich the store and write pulse outputs
    Enrich,

    /// Send alerts for new CIO / HOTLIST entries
    Notify {
        /// Log alerts instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Check CIO feed health (exit code 1 on failure)
    Health {
        /// Fail on any empty feed instead of waiting for the streak
        #[arg(long)]
        manual: bool,
    },

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("lurker=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = startup_checks(&config).await {
        error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Run => commands::run(&config).await,
        Commands::Collect { name } => commands::collect(&config, name.as_deref()).await,
        Commands::Classify => commands::classify(&config).await,
        Commands::Enrich => commands::enrich(&config).await,
        Commands::Notify { dry_run } => commands::notify(&config, dry_run).await,
        Commands::Health { manual } => commands::health(&config, manual).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Make sure the data directories exist before any task writes into them
async fn startup_checks(config: &Config) -> Result<()> {
    info!("Performing startup checks...");

    for dir in [
        config.storage.data_dir.clone(),
        config.storage.signals_dir(),
        config.storage.state_dir(),
    ] {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            anyhow::anyhow!("Cannot create data directory {}: {}", dir.display(), e)
        })?;
    }

    if config.notifier.enabled && !config.notifier.has_credentials() {
        warn!("Telegram credentials not set - notifier will run in dry-run mode");
    }

    let enabled = config.collectors.iter().filter(|c| c.enabled).count();
    info!("Startup checks passed ({} collectors enabled)", enabled);
    Ok(())
}
