// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod snapshots;

pub use event_bus::InMemoryBus;
pub use snapshots::{snapshot_store_for, InMemorySnapshotStore, JsonFileSnapshotStore, NullSnapshotStore};
