// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cycle Detector Domain Service
//!
//! Decides whether a set of alias → target edges contains a cycle. Every alias
//! points at exactly one target, so the edge set is a functional graph
//! (out-degree ≤ 1) and a cycle is found by following each chain until it
//! either leaves the edge set or revisits a node of the current walk.
//!
//! Nodes are coloured as they are walked, so a chain already proven
//! cycle-free is never walked again and the check is linear in the number of
//! aliases.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Keep every committed alias graph acyclic

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::domain::alias::RegistryState;

/// A rejected alias graph, carrying the offending walk.
///
/// The path starts at the first alias whose chain loops and ends with the
/// repeated node, e.g. `["a", "b", "a"]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Alias cycle detected: {}", .0.join(" -> "))]
pub struct CycleError(pub Vec<String>);

impl CycleError {
    pub fn path(&self) -> &[String] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnWalk,
    Done,
}

pub struct CycleDetector;

impl CycleDetector {
    /// Return the first cycle found in `edges` (alias → target), if any.
    ///
    /// Starts are visited in key order, which makes the reported path
    /// deterministic for a given edge set.
    pub fn check(edges: &BTreeMap<String, String>) -> Option<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(edges.len() * 2);

        for start in edges.keys() {
            if marks.contains_key(start.as_str()) {
                continue;
            }

            let mut walk: Vec<&str> = Vec::new();
            let mut pos = start.as_str();

            let looped = loop {
                match marks.get(pos) {
                    Some(Mark::Done) => break false,
                    Some(Mark::OnWalk) => break true,
                    None => {}
                }

                marks.insert(pos, Mark::OnWalk);
                walk.push(pos);

                match edges.get(pos) {
                    Some(next) => pos = next.as_str(),
                    None => break false,
                }
            };

            if looped {
                walk.push(pos);
                return Some(walk.into_iter().map(str::to_owned).collect());
            }

            for node in walk {
                marks.insert(node, Mark::Done);
            }
        }

        None
    }

    /// Check the graph induced by a registry state.
    pub fn check_state(state: &RegistryState) -> Result<(), CycleError> {
        match Self::check(&state.edges()) {
            Some(path) => Err(CycleError(path)),
            None => Ok(()),
        }
    }
}
