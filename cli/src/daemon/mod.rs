// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Relay server mode
//!
//! Handles:
//! - Wiring the bus, registry, control surface and HTTP bridge
//! - Graceful shutdown on Ctrl+C or SIGTERM

pub mod server;

pub use server::{start_relay, RelayServer};
