// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`alias-relay-core`)
//!
//! Surfaces that translate external requests into registry and bus calls.
//! No alias logic lives here; the work is delegated to
//! `crate::application::registry`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`control`] | Bus topics | `meta/alias/*` control surface driving the registry |
//! | [`api`] | HTTP/SSE (Axum) | Publish, read, register and watch topics over HTTP |

pub mod api;
pub mod control;

pub use control::ControlSurface;
