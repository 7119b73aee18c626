// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `serve` command
//!
//! Flags override the loaded configuration, which already carries any
//! `ALIAS_RELAY_*` environment overrides.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use alias_relay_core::domain::relay_config::RelayConfigManifest;

use crate::daemon::start_relay;

#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// HTTP bridge port
    #[arg(long, env = "ALIAS_RELAY_PORT")]
    pub port: Option<u16>,

    /// HTTP bridge bind address
    #[arg(long, env = "ALIAS_RELAY_HOST")]
    pub host: Option<String>,

    /// Control topic prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Snapshot file for alias persistence
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut RelayConfigManifest) {
        if let Some(port) = self.port {
            config.spec.network.port = port;
        }
        if let Some(host) = &self.host {
            config.spec.network.bind_address = host.clone();
        }
        if let Some(prefix) = &self.prefix {
            config.spec.control.prefix = prefix.clone();
        }
        if let Some(snapshot) = &self.snapshot {
            config.spec.persistence.snapshot_path = Some(snapshot.clone());
        }
    }
}

pub async fn execute(args: ServeArgs, config_override: Option<PathBuf>) -> Result<()> {
    let mut config = RelayConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;
    args.apply(&mut config);

    start_relay(config).await
}
