// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Alias Relay Core
//!
//! Keeps a set of alias topics mirrored onto their targets on a
//! publish/subscribe bus, with optional value transforms, cycle rejection and
//! snapshot persistence.
//!
//! # Architecture
//!
//! - **Domain:** alias specs, cycle detection, value transforms, bus and
//!   snapshot contracts, relay configuration
//! - **Application:** alias registry and per-alias mirrors
//! - **Infrastructure:** in-process bus, snapshot stores
//! - **Presentation:** bus control surface, HTTP bridge

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
