// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot Store Implementations
//!
//! Infrastructure implementations of the `SnapshotStore` contract from
//! `crate::domain::repository`.
//!
//! - **JsonFileSnapshotStore** - one pretty-printed JSON file, written to a
//!   sibling temp file and renamed into place so readers never see a torn write
//! - **NullSnapshotStore** - persistence disabled
//! - **InMemorySnapshotStore** - lightweight store for tests and embedding

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::alias::RegistryState;
use crate::domain::repository::{SnapshotBackend, SnapshotError, SnapshotStore};

/// Build the store for a configured backend
pub fn snapshot_store_for(backend: &SnapshotBackend) -> Arc<dyn SnapshotStore> {
    match backend {
        SnapshotBackend::Disabled => Arc::new(NullSnapshotStore),
        SnapshotBackend::JsonFile(path) => Arc::new(JsonFileSnapshotStore::new(path.clone())),
    }
}

pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "aliases.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> Result<Option<RegistryState>, SnapshotError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot file yet");
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let state = serde_json::from_str(&content).map_err(|source| SnapshotError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(state))
    }

    async fn save(&self, state: &RegistryState) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &json)
            .await
            .map_err(|e| self.io_error(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;

        info!(path = %self.path.display(), aliases = state.len(), "Saved alias snapshot");
        Ok(())
    }
}

/// Discards every snapshot
pub struct NullSnapshotStore;

#[async_trait]
impl SnapshotStore for NullSnapshotStore {
    async fn load(&self) -> Result<Option<RegistryState>, SnapshotError> {
        Ok(None)
    }

    async fn save(&self, _state: &RegistryState) -> Result<(), SnapshotError> {
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    state: Arc<Mutex<Option<RegistryState>>>,
    saves: Arc<Mutex<usize>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RegistryState) -> Self {
        let store = Self::default();
        *store.state.lock() = Some(state);
        store
    }

    pub fn snapshot(&self) -> Option<RegistryState> {
        self.state.lock().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> Result<Option<RegistryState>, SnapshotError> {
        Ok(self.state.lock().clone())
    }

    async fn save(&self, state: &RegistryState) -> Result<(), SnapshotError> {
        *self.state.lock() = Some(state.clone());
        *self.saves.lock() += 1;
        Ok(())
    }
}
