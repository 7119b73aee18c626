// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod mirror;
pub mod registry;
pub mod reporting;

// Re-export services for convenience
pub use mirror::{AliasMirror, MirrorError};
pub use registry::{
    AliasRegistry, ReconcilePlan, ReconcileSummary, RegistryError, RegistrySettings, RegistryStatus, UpdateOutcome,
};
pub use reporting::{ErrorReporter, REGISTRY_ORIGIN};
