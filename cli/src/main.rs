// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Alias Relay CLI
//!
//! The `alias-relay` binary runs the alias registry on an in-process bus and
//! exposes it over HTTP.
//!
//! ## Commands
//!
//! - `alias-relay serve` - Run the relay in the foreground
//! - `alias-relay check <snapshot>` - Validate a snapshot file offline
//! - `alias-relay config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use alias_relay::commands::{self, ConfigCommand, ServeArgs};
use alias_relay_core::domain::relay_config::{LoggingConfig, RelayConfigManifest};

/// Alias Relay - mirror alias topics onto their targets
#[derive(Parser)]
#[command(name = "alias-relay")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ALIAS_RELAY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "ALIAS_RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay in the foreground
    #[command(name = "serve")]
    Serve(ServeArgs),

    /// Validate an alias snapshot file without starting the relay
    #[command(name = "check")]
    Check {
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // A broken config file is reported by the command itself
    let logging = RelayConfigManifest::load_or_default(cli.config.clone())
        .map(|config| config.spec.observability.logging)
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level.clone());
    init_logging(&level, &logging)?;

    match cli.command {
        Some(Commands::Serve(args)) => commands::serve::execute(args, cli.config).await,
        Some(Commands::Check { snapshot }) => commands::check::execute(snapshot).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
