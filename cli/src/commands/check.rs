// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `check` command - offline snapshot validation
//!
//! A snapshot is restored through a wholesale replace, which does not
//! re-validate declarations. This catches what the relay would otherwise
//! only surface as stale aliases or a discarded snapshot.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use alias_relay_core::domain::alias::{AliasDeclaration, RegistryState};
use alias_relay_core::domain::cycle::CycleDetector;
use alias_relay_core::domain::repository::SnapshotStore;
use alias_relay_core::infrastructure::snapshots::JsonFileSnapshotStore;

#[derive(Debug, Default)]
pub struct SnapshotReport {
    pub aliases: usize,
    pub problems: Vec<String>,
}

impl SnapshotReport {
    pub fn inspect(state: &RegistryState) -> Self {
        let mut problems = Vec::new();

        for (key, spec) in state.iter() {
            if key != &spec.alias {
                problems.push(format!("Entry '{}' declares alias '{}'", key, spec.alias));
            }
            if let Err(e) = AliasDeclaration::from(spec.clone()).into_spec() {
                problems.push(format!("{}: {}", key, e));
            }
        }

        if let Err(cycle) = CycleDetector::check_state(state) {
            problems.push(cycle.to_string());
        }

        Self {
            aliases: state.len(),
            problems,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

pub async fn execute(snapshot: PathBuf) -> Result<()> {
    let store = JsonFileSnapshotStore::new(&snapshot);
    let state = store
        .load()
        .await
        .with_context(|| format!("Failed to read snapshot {}", snapshot.display()))?
        .with_context(|| format!("Snapshot not found: {}", snapshot.display()))?;

    let report = SnapshotReport::inspect(&state);
    if report.is_ok() {
        println!(
            "{}",
            format!("✓ Snapshot is valid ({} aliases)", report.aliases).green()
        );
        return Ok(());
    }

    println!("{}", format!("✗ {}", snapshot.display()).red().bold());
    for problem in &report.problems {
        println!("  - {}", problem);
    }
    anyhow::bail!("{} problem(s) found in snapshot", report.problems.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alias_relay_core::domain::alias::AliasSpec;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_valid_state() {
        let state: RegistryState = [
            AliasSpec::new("a", "b"),
            AliasSpec::new("b", "c").with_transform("x + 1", "x - 1"),
        ]
        .into_iter()
        .collect();

        let report = SnapshotReport::inspect(&state);
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.aliases, 2);
    }

    #[test]
    fn test_reports_every_problem() {
        let state: RegistryState = serde_json::from_value(json!({
            "b": { "target": "a", "alias": "b", "transform": "x * 2", "description": "" },
            "wrong": { "target": "a", "alias": "other", "description": "" },
            "a": { "target": "b", "alias": "a", "description": "" },
        }))
        .unwrap();

        let report = SnapshotReport::inspect(&state);
        assert_eq!(report.problems.len(), 3, "{:?}", report.problems);
        assert!(report.problems.iter().any(|p| p.contains("inverse")));
        assert!(report.problems.iter().any(|p| p.contains("declares alias 'other'")));
        assert!(report.problems.iter().any(|p| p.contains("cycle")));
    }

    #[tokio::test]
    async fn test_execute_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = execute(temp_dir.path().join("missing.json")).await.unwrap_err();
        assert!(err.to_string().contains("Snapshot not found"));
    }

    #[tokio::test]
    async fn test_execute_valid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("aliases.json");
        let store = JsonFileSnapshotStore::new(&path);
        store
            .save(&[AliasSpec::new("x", "y")].into_iter().collect())
            .await
            .unwrap();

        execute(path).await.unwrap();
    }
}
