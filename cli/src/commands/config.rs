// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use alias_relay_core::domain::relay_config::RelayConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./alias-relay.yaml)
        #[arg(short, long, default_value = "./alias-relay.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = RelayConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  --config flag: {}", path.display());
        } else {
            println!("  --config flag: {}", "(not set)".dimmed());
        }
        for (i, path) in RelayConfigManifest::search_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} ({})", i + 1, path.display(), marker);
        }
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Relay:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(labels) = &config.metadata.labels {
        println!("  Labels: {}", format_labels(labels));
    }
    println!();

    let topics = config.control_topics();
    println!("{}", "Control topics:".bold());
    println!("  Add: {}", topics.add);
    println!("  Remove: {}", topics.remove);
    println!("  Aliases: {}", topics.aliases);
    println!("  Error: {}", topics.error);
    println!("  Resync: {}", topics.resync);
    println!();

    println!("{}", "Persistence:".bold());
    match &config.spec.persistence.snapshot_path {
        Some(path) => println!("  Snapshot: {}", path.display()),
        None => println!("  Snapshot: {}", "(disabled)".dimmed()),
    }
    println!();

    println!("{}", "Runtime:".bold());
    println!("  Mirror timeout: {:?}", config.mirror_timeout());
    println!("  Bus channel capacity: {}", config.spec.bus.channel_capacity);
    println!(
        "  HTTP bridge: {}:{}",
        config.spec.network.bind_address, config.spec.network.port
    );
    println!(
        "  Logging: {} ({})",
        config.spec.observability.logging.level, config.spec.observability.logging.format
    );
    println!();

    Ok(())
}

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = RelayConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    if with_examples {
        std::fs::write(&output, include_str!("../../templates/config-with-examples.yaml"))
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    } else {
        RelayConfigManifest::default()
            .to_yaml_file(&output)
            .with_context(|| format!("Failed to write config to {:?}", output))?;
    }

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_generated_configs_validate() {
        let temp_dir = TempDir::new().unwrap();

        for examples in [false, true] {
            let path = temp_dir.path().join(format!("relay-{}.yaml", examples));
            generate(path.clone(), examples).await.unwrap();

            let config = RelayConfigManifest::from_yaml_file(&path).unwrap();
            config.validate().unwrap();

            if examples {
                let labels = config.metadata.labels.as_ref().unwrap();
                assert_eq!(format_labels(labels), "site=home");
            }
        }
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_kind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("relay.yaml");
        std::fs::write(
            &path,
            "apiVersion: alias-relay/v1\nkind: NodeConfig\nmetadata:\n  name: test\nspec: {}\n",
        )
        .unwrap();

        assert!(validate(Some(path)).await.is_err());
    }
}
