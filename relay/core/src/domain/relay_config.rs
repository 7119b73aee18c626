// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Relay Configuration Types
//
// Defines the configuration manifest for an alias relay process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Control surface topic prefix
// - Snapshot persistence
// - Reconciliation timeouts
// - In-process bus, HTTP bridge and logging settings

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::bus::ControlTopics;
use crate::domain::repository::SnapshotBackend;

pub const API_VERSION: &str = "alias-relay/v1";
pub const KIND: &str = "RelayConfig";

/// Top-level Kubernetes-style relay configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfigManifest {
    /// API version (must be "alias-relay/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RelayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: RelayConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable relay name
    pub name: String,

    /// Free-form tags identifying this relay, shown by `config show`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfigSpec {
    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub reconciliation: ReconciliationConfig,

    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Prefix of the add/remove/aliases/error topics
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// JSON snapshot file; persistence is disabled when unset
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Upper bound for a single mirror start or stop during an update
    #[serde(default = "default_mirror_timeout_ms")]
    pub mirror_timeout_ms: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            mirror_timeout_ms: default_mirror_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Per-topic broadcast buffer of the in-process bus
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address of the HTTP bridge (e.g. "0.0.0.0" or "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP bridge port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_prefix() -> String {
    ControlTopics::DEFAULT_PREFIX.to_string()
}

fn default_mirror_timeout_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for RelayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "alias-relay".to_string(),
                labels: None,
            },
            spec: RelayConfigSpec::default(),
        }
    }
}

impl RelayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate configuration paths in precedence order
    /// 1. ALIAS_RELAY_CONFIG_PATH environment variable
    /// 2. ./alias-relay.yaml (working directory)
    /// 3. ~/.config/alias-relay/config.yaml (user config dir)
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(path) = std::env::var("ALIAS_RELAY_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }

        paths.push(PathBuf::from("./alias-relay.yaml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("alias-relay").join("config.yaml"));
        }

        paths
    }

    /// First existing configuration file from `search_paths`
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ALIAS_RELAY_PREFIX") {
            tracing::info!("Environment override: ALIAS_RELAY_PREFIX={}", val);
            self.spec.control.prefix = val;
        }

        if let Ok(val) = std::env::var("ALIAS_RELAY_SNAPSHOT_PATH") {
            tracing::info!("Environment override: ALIAS_RELAY_SNAPSHOT_PATH={}", val);
            self.spec.persistence.snapshot_path = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        if let Ok(val) = std::env::var("ALIAS_RELAY_LOG_LEVEL") {
            self.spec.observability.logging.level = val;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let prefix = self.spec.control.prefix.trim_matches('/');
        if prefix.is_empty() {
            anyhow::bail!("spec.control.prefix cannot be empty");
        }

        if self.spec.reconciliation.mirror_timeout_ms == 0 {
            anyhow::bail!("spec.reconciliation.mirror_timeout_ms must be greater than zero");
        }

        if self.spec.bus.channel_capacity == 0 {
            anyhow::bail!("spec.bus.channel_capacity must be greater than zero");
        }

        match self.spec.observability.logging.format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("Invalid logging format: '{}'. Must be 'json' or 'text'", other),
        }

        Ok(())
    }

    pub fn control_topics(&self) -> ControlTopics {
        ControlTopics::from_prefix(&self.spec.control.prefix)
    }

    pub fn mirror_timeout(&self) -> Duration {
        Duration::from_millis(self.spec.reconciliation.mirror_timeout_ms)
    }

    pub fn snapshot_backend(&self) -> SnapshotBackend {
        match &self.spec.persistence.snapshot_path {
            Some(path) => SnapshotBackend::JsonFile(path.clone()),
            None => SnapshotBackend::Disabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = RelayConfigManifest::default();
        assert_eq!(manifest.api_version, "alias-relay/v1");
        assert_eq!(manifest.kind, "RelayConfig");
        assert_eq!(manifest.spec.control.prefix, "meta/alias");
        assert_eq!(manifest.snapshot_backend(), SnapshotBackend::Disabled);
        assert_eq!(manifest.mirror_timeout(), Duration::from_secs(5));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: alias-relay/v1
kind: RelayConfig
metadata:
  name: site-a
spec:
  control:
    prefix: site-a/alias
  persistence:
    snapshot_path: /var/lib/alias-relay/aliases.json
"#;
        let manifest = RelayConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "site-a");
        assert_eq!(manifest.control_topics().add, "site-a/alias/add");
        assert_eq!(
            manifest.snapshot_backend(),
            SnapshotBackend::JsonFile(PathBuf::from("/var/lib/alias-relay/aliases.json"))
        );
        assert_eq!(manifest.spec.reconciliation.mirror_timeout_ms, 5000);
        assert_eq!(manifest.spec.network.port, 8600);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut manifest = RelayConfigManifest::default();
        manifest.spec.reconciliation.mirror_timeout_ms = 250;
        manifest.spec.observability.logging.format = "json".to_string();

        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed = RelayConfigManifest::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.spec.reconciliation.mirror_timeout_ms, 250);
        assert_eq!(parsed.spec.observability.logging.format, "json");
    }

    #[test]
    fn test_validation() {
        let mut manifest = RelayConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.control.prefix = "/".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.control.prefix = "meta/alias".to_string();

        manifest.spec.reconciliation.mirror_timeout_ms = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.reconciliation.mirror_timeout_ms = 100;

        manifest.spec.observability.logging.format = "xml".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.observability.logging.format = "text".to_string();

        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.yaml");
        let mut manifest = RelayConfigManifest::default();
        manifest.metadata.name = "from-file".to_string();
        manifest.to_yaml_file(&path).unwrap();

        let loaded = RelayConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "from-file");

        let missing = RelayConfigManifest::load_or_default(Some(dir.path().join("nope.yaml")));
        assert!(missing.is_err());
    }
}
