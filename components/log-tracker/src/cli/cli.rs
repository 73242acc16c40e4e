// Local crates
use crate::{
    helpers::{
        load_config::{Config, LoggingConfig},
        shutdown::Shutdown,
    },
    instrumentation::tracing::{init_panic_handler, init_tracing},
    runtime,
};

// External crates
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "logtracker",
    long_about = "logtracker tails a fixed set of files, relays every appended line into a staging file per source and bundles the staging files into a compressed archive on shutdown.",
    about = "Tail log files into staging files, archive them on shutdown",
    version,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        logtracker run --config /etc/log_tracker.toml
        logtracker validate --config ./log_tracker.toml"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track the configured files until SIGINT/SIGTERM, then archive
    Run {
        #[arg(short, long, default_value = "/etc/log_tracker.toml")]
        config: PathBuf,
    },

    /// Validate the configuration file and print the effective settings
    Validate {
        #[arg(short, long, default_value = "/etc/log_tracker.toml")]
        config: PathBuf,
    },

    /// Display version information
    Version,
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_tracker(config).await?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

async fn run_tracker(config: PathBuf) -> Result<()> {
    let cfg = Config::load(&config)?;

    let _guard = init_tracing(&cfg.logging)?;
    init_panic_handler();

    let shutdown = Shutdown::new();
    shutdown
        .listen_for_signals()
        .context("Failed to install signal handlers")?;

    let result = runtime::runtime::run_log_tracker(cfg, shutdown).await;
    if let Err(e) = &result {
        tracing::error!(error = ?e, "Log tracker exited with an error");
    }
    result
}

fn validate_config(config: PathBuf) -> Result<()> {
    let _guard = init_tracing(&LoggingConfig::default())?;

    println!("Validating configuration file: {:?}", config);
    let cfg = Config::load(&config)?;
    println!("Configuration valid:\n\n{}", cfg.to_toml_string()?);
    Ok(())
}

fn show_version() {
    println!("logtracker {}", env!("CARGO_PKG_VERSION"));
}
