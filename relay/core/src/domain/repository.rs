// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Snapshot Repository Interface
//!
//! Persistence contract for the committed `RegistryState`. The interface is
//! defined here in the domain layer and implemented in
//! `crate::infrastructure::snapshots`.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | `JsonFileSnapshotStore` | Single JSON file, replaced atomically |
//! | `NullSnapshotStore` | No-op sink (persistence disabled) |
//! | `InMemorySnapshotStore` | Process memory, for tests and embedding |
//!
//! The registry reads a snapshot once at startup and writes one after every
//! successful commit. Write failures never roll back a commit.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::alias::RegistryState;

/// Where the registry persists its committed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotBackend {
    Disabled,
    JsonFile(PathBuf),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last committed state; `None` when nothing was saved yet
    async fn load(&self) -> Result<Option<RegistryState>, SnapshotError>;

    /// Persist a committed state, replacing the previous snapshot
    async fn save(&self, state: &RegistryState) -> Result<(), SnapshotError>;
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot at {path} is not a valid alias map: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
