// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Alias model, cycle detection, transform expressions and the contracts of
//! the external collaborators (bus transport, snapshot persistence).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and rules; no I/O

pub mod alias;
pub mod bus;
pub mod cycle;
pub mod relay_config;
pub mod repository;
pub mod transform;
