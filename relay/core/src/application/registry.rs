// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Alias Registry Application Service
//!
//! Owns the authoritative alias state and the set of running mirrors, and
//! reconciles the two whenever a new candidate state arrives.
//!
//! # Reconciliation
//!
//! Every mutation (declare, remove, replace, resync) funnels into one update
//! that runs while holding the registry lock:
//!
//! 1. diff the candidate against the committed state
//! 2. reject the candidate if an entry is keyed by anything but its alias
//! 3. reject the candidate if its alias graph has a cycle
//! 4. stop mirrors for removed and changed aliases
//! 5. start mirrors for added, changed and stale aliases
//! 6. commit, republish the canonical state and persist it
//!
//! Mirror stops within one update run concurrently, each bounded by the
//! configured mirror timeout. Starts run concurrently in waves ordered by
//! dependency: an alias whose target is itself being started waits for the
//! wave that registers that target, so it inherits the target's kind rather
//! than defaulting to an event. A mirror that fails or times out leaves
//! its alias *stale*: present in the state with no running mirror. Stale
//! aliases are retried on every subsequent update.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Serialise alias mutations and keep mirrors in step with state

use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::application::mirror::{AliasMirror, MirrorError};
use crate::application::reporting::{ErrorReporter, REGISTRY_ORIGIN};
use crate::domain::alias::{AliasDeclaration, AliasSpec, DeclarationError, RegistryState};
use crate::domain::bus::{Bus, BusMessage, ControlTopics, TopicInfo};
use crate::domain::cycle::{CycleDetector, CycleError};
use crate::domain::relay_config::RelayConfigManifest;
use crate::domain::repository::SnapshotStore;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("Alias set entry '{key}' declares alias '{alias}'; entries must be keyed by their alias")]
    KeyMismatch { key: String, alias: String },
}

/// What an update changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    /// Stale aliases whose mirrors were started by this update
    pub recovered: Vec<String>,
    /// Aliases left stale because their mirror failed to stop or start
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Candidate equal to the committed state and nothing stale
    Unchanged,
    Applied(ReconcileSummary),
}

impl UpdateOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Difference between the committed state and a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    /// Unchanged aliases with no running mirror
    pub stale: Vec<String>,
}

impl ReconcilePlan {
    pub fn diff(
        current: &RegistryState,
        candidate: &RegistryState,
        is_running: impl Fn(&str) -> bool,
    ) -> Self {
        let mut plan = Self::default();

        for (alias, spec) in candidate.iter() {
            match current.get(alias) {
                None => plan.added.push(alias.clone()),
                Some(existing) if existing != spec => plan.changed.push(alias.clone()),
                Some(_) if !is_running(alias) => plan.stale.push(alias.clone()),
                Some(_) => {}
            }
        }
        for (alias, _) in current.iter() {
            if !candidate.contains(alias) {
                plan.removed.push(alias.clone());
            }
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty() && self.stale.is_empty()
    }
}

/// Start order for the given aliases: each wave only contains aliases whose
/// target is not started by the same or a later wave.
///
/// `candidate` must be acyclic.
pub fn start_waves(candidate: &RegistryState, aliases: &[String]) -> Vec<Vec<String>> {
    let depth_of = |alias: &String| {
        let mut depth = 0;
        let mut current = alias;
        while let Some(spec) = candidate.get(current) {
            if depth == aliases.len() || !aliases.contains(&spec.target) {
                break;
            }
            depth += 1;
            current = &spec.target;
        }
        depth
    };

    let mut waves: Vec<Vec<String>> = Vec::new();
    for alias in aliases {
        let depth = depth_of(alias);
        if waves.len() <= depth {
            waves.resize_with(depth + 1, Vec::new);
        }
        waves[depth].push(alias.clone());
    }
    waves
}

/// Committed view of the registry, readable without waiting on an update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStatus {
    pub state: RegistryState,
    pub running: Vec<String>,
    pub stale: Vec<String>,
}

impl RegistryStatus {
    fn of(inner: &RegistryInner) -> Self {
        let is_running = |alias: &str| inner.mirrors.get(alias).is_some_and(AliasMirror::is_running);
        Self {
            state: inner.state.clone(),
            running: inner
                .mirrors
                .keys()
                .filter(|alias| is_running(alias.as_str()))
                .cloned()
                .collect(),
            stale: inner
                .state
                .iter()
                .filter(|(alias, _)| !is_running(alias.as_str()))
                .map(|(alias, _)| alias.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub topics: ControlTopics,
    pub mirror_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            topics: ControlTopics::default(),
            mirror_timeout: Duration::from_secs(5),
        }
    }
}

impl RegistrySettings {
    pub fn from_config(config: &RelayConfigManifest) -> Self {
        Self {
            topics: config.control_topics(),
            mirror_timeout: config.mirror_timeout(),
        }
    }
}

struct RegistryInner {
    state: RegistryState,
    /// Keyed by the state key of the alias each mirror runs
    mirrors: BTreeMap<String, AliasMirror>,
}

pub struct AliasRegistry {
    bus: Arc<dyn Bus>,
    store: Arc<dyn SnapshotStore>,
    topics: ControlTopics,
    mirror_timeout: Duration,
    reporter: ErrorReporter,
    inner: Mutex<RegistryInner>,
    status: watch::Sender<RegistryStatus>,
}

impl AliasRegistry {
    pub fn new(bus: Arc<dyn Bus>, store: Arc<dyn SnapshotStore>, settings: RegistrySettings) -> Self {
        let reporter = ErrorReporter::new(bus.clone(), settings.topics.error.clone());
        let (status, _) = watch::channel(RegistryStatus::default());
        Self {
            bus,
            store,
            topics: settings.topics,
            mirror_timeout: settings.mirror_timeout,
            reporter,
            inner: Mutex::new(RegistryInner {
                state: RegistryState::new(),
                mirrors: BTreeMap::new(),
            }),
            status,
        }
    }

    /// Register the registry's output topics, publish the initial state and
    /// restore the last snapshot, if any.
    ///
    /// A snapshot that cannot be loaded or applied is logged and the registry
    /// starts empty.
    pub async fn open(
        bus: Arc<dyn Bus>,
        store: Arc<dyn SnapshotStore>,
        settings: RegistrySettings,
    ) -> anyhow::Result<Arc<Self>> {
        let registry = Arc::new(Self::new(bus, store, settings));

        registry
            .bus
            .register(TopicInfo::property(
                registry.topics.aliases.clone(),
                "Authoritative alias set, keyed by alias path",
            ))
            .await?;
        registry
            .bus
            .register(TopicInfo::event(
                registry.topics.error.clone(),
                "Rejected alias requests and mirror failures",
            ))
            .await?;

        match registry.store.load().await {
            Ok(Some(snapshot)) => {
                info!(aliases = snapshot.len(), "Restoring alias snapshot");
                if let Err(e) = registry.replace(snapshot).await {
                    warn!("Discarding alias snapshot: {}", e);
                    registry.publish_current().await;
                }
            }
            Ok(None) => registry.publish_current().await,
            Err(e) => {
                warn!("Failed to load alias snapshot, starting empty: {}", e);
                registry.publish_current().await;
            }
        }

        Ok(registry)
    }

    pub fn topics(&self) -> &ControlTopics {
        &self.topics
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    /// Add or redefine one alias
    pub async fn declare(&self, declaration: AliasDeclaration) -> Result<UpdateOutcome, RegistryError> {
        let spec = match declaration.into_spec() {
            Ok(spec) => spec,
            Err(e) => {
                self.reporter.report(e.to_string()).await;
                return Err(e.into());
            }
        };

        info!(alias = %spec.alias, target = %spec.target, "Declaring alias");
        self.apply(move |state| state.with_alias(spec)).await
    }

    /// Remove one alias. Unknown aliases are a no-op.
    pub async fn remove(&self, alias: &str) -> Result<UpdateOutcome, RegistryError> {
        info!(alias = %alias, "Removing alias");
        self.apply(|state| state.without_alias(alias)).await
    }

    /// Wholesale replacement of the alias set.
    ///
    /// Specs are taken as given: an unpaired transform is not rejected here
    /// and an unparsable expression only surfaces as a mirror start failure.
    pub async fn replace(&self, state: RegistryState) -> Result<UpdateOutcome, RegistryError> {
        self.apply(move |_| state).await
    }

    /// Reconcile against an explicit candidate state
    pub async fn update(&self, candidate: RegistryState) -> Result<UpdateOutcome, RegistryError> {
        self.apply(move |_| candidate).await
    }

    /// Retry mirrors for stale aliases without changing the state
    pub async fn resync(&self) -> Result<UpdateOutcome, RegistryError> {
        self.apply(RegistryState::clone).await
    }

    /// Last committed state and mirror set. Never waits on an update in
    /// progress.
    pub fn status(&self) -> RegistryStatus {
        self.status.borrow().clone()
    }

    pub async fn current_state(&self) -> RegistryState {
        self.inner.lock().await.state.clone()
    }

    /// Aliases with a running mirror
    pub async fn running_aliases(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .mirrors
            .iter()
            .filter(|(_, mirror)| mirror.is_running())
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Aliases present in the state without a running mirror
    pub async fn stale_aliases(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .state
            .iter()
            .filter(|(alias, _)| !inner.mirrors.get(*alias).is_some_and(AliasMirror::is_running))
            .map(|(alias, _)| alias.clone())
            .collect()
    }

    /// Republish the committed state on the aliases topic
    pub async fn publish_current(&self) {
        let inner = self.inner.lock().await;
        self.publish_state(&inner.state).await;
    }

    /// Stop every mirror. The committed state and snapshot are kept.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        let mirrors = std::mem::take(&mut inner.mirrors);
        info!(mirrors = mirrors.len(), "Stopping alias mirrors");

        for (alias, result) in self.stop_all(mirrors).await {
            if let Err(e) = result {
                error!(alias = %alias, "Failed to stop alias mirror during shutdown: {}", e);
            }
        }
        self.status.send_replace(RegistryStatus::of(&inner));
    }

    async fn apply<F>(&self, build: F) -> Result<UpdateOutcome, RegistryError>
    where
        F: FnOnce(&RegistryState) -> RegistryState,
    {
        let mut inner = self.inner.lock().await;
        let candidate = build(&inner.state);
        self.reconcile(&mut inner, candidate).await
    }

    async fn reconcile(
        &self,
        inner: &mut RegistryInner,
        candidate: RegistryState,
    ) -> Result<UpdateOutcome, RegistryError> {
        let plan = ReconcilePlan::diff(&inner.state, &candidate, |alias| {
            inner.mirrors.get(alias).is_some_and(AliasMirror::is_running)
        });
        if plan.is_empty() {
            debug!("Alias state unchanged");
            return Ok(UpdateOutcome::Unchanged);
        }

        if let Some((key, spec)) = candidate.mismatched_entry() {
            let err = RegistryError::KeyMismatch {
                key: key.clone(),
                alias: spec.alias.clone(),
            };
            self.reporter.report(err.to_string()).await;
            self.publish_state(&inner.state).await;
            return Err(err);
        }

        if let Err(cycle) = CycleDetector::check_state(&candidate) {
            self.reporter.report(cycle.to_string()).await;
            self.publish_state(&inner.state).await;
            return Err(cycle.into());
        }

        let mut summary = ReconcileSummary {
            added: plan.added.clone(),
            removed: plan.removed.clone(),
            changed: plan.changed.clone(),
            ..Default::default()
        };

        let to_stop: Vec<(String, AliasMirror)> = plan
            .removed
            .iter()
            .chain(&plan.changed)
            .chain(&plan.stale)
            .filter_map(|alias| inner.mirrors.remove_entry(alias))
            .collect();
        for (alias, result) in self.stop_all(to_stop).await {
            if let Err(e) = result {
                self.reporter
                    .report(format!("Failed to stop mirror for alias '{}': {}", alias, e))
                    .await;
                if candidate.contains(&alias) {
                    summary.failed.push(alias);
                }
            }
        }

        let to_start: Vec<String> = plan
            .added
            .iter()
            .chain(&plan.changed)
            .chain(&plan.stale)
            .filter(|alias| !summary.failed.contains(alias))
            .cloned()
            .collect();
        for wave in start_waves(&candidate, &to_start) {
            let specs: Vec<(String, AliasSpec)> = wave
                .into_iter()
                .filter_map(|alias| candidate.get(&alias).cloned().map(|spec| (alias, spec)))
                .collect();
            for (alias, mirror, result) in self.start_all(specs).await {
                match result {
                    Ok(()) => {
                        if plan.stale.contains(&alias) {
                            summary.recovered.push(alias.clone());
                        }
                        inner.mirrors.insert(alias, mirror);
                    }
                    Err(e) => {
                        self.reporter
                            .report(format!("Failed to start mirror for alias '{}': {}", alias, e))
                            .await;
                        summary.failed.push(alias);
                    }
                }
            }
        }

        inner.state = candidate;
        self.status.send_replace(RegistryStatus::of(inner));
        info!(
            aliases = inner.state.len(),
            added = summary.added.len(),
            removed = summary.removed.len(),
            changed = summary.changed.len(),
            failed = summary.failed.len(),
            "Alias state committed"
        );

        self.publish_state(&inner.state).await;
        if let Err(e) = self.store.save(&inner.state).await {
            error!("Failed to persist alias snapshot: {}", e);
        }

        Ok(UpdateOutcome::Applied(summary))
    }

    async fn stop_all(
        &self,
        mirrors: impl IntoIterator<Item = (String, AliasMirror)>,
    ) -> Vec<(String, Result<(), MirrorError>)> {
        let timeout = self.mirror_timeout;
        join_all(mirrors.into_iter().map(|(key, mut mirror)| async move {
            let alias = mirror.spec().alias.clone();
            let result = match tokio::time::timeout(timeout, mirror.stop()).await {
                Ok(result) => result,
                Err(_) => Err(MirrorError::Timeout {
                    alias: alias.clone(),
                    operation: "stop",
                    timeout,
                }),
            };
            (key, result)
        }))
        .await
    }

    async fn start_all(
        &self,
        specs: Vec<(String, AliasSpec)>,
    ) -> Vec<(String, AliasMirror, Result<(), MirrorError>)> {
        let timeout = self.mirror_timeout;
        join_all(specs.into_iter().map(|(key, spec)| {
            let mut mirror = AliasMirror::new(spec, self.bus.clone(), self.reporter.clone());
            async move {
                let alias = mirror.spec().alias.clone();
                let result = match tokio::time::timeout(timeout, mirror.start()).await {
                    Ok(result) => result,
                    Err(_) => Err(MirrorError::Timeout {
                        alias: alias.clone(),
                        operation: "start",
                        timeout,
                    }),
                };
                if result.is_err() {
                    // Undo whatever the failed start managed to set up
                    if let Ok(Err(e)) = tokio::time::timeout(timeout, mirror.stop()).await {
                        debug!(alias = %alias, "Cleanup after failed start: {}", e);
                    }
                }
                (key, mirror, result)
            }
        }))
        .await
    }

    async fn publish_state(&self, state: &RegistryState) {
        let message = BusMessage::new(self.topics.aliases.clone(), state.to_value()).with_origin(REGISTRY_ORIGIN);
        if let Err(e) = self.bus.publish(message).await {
            error!("Failed to publish alias state: {}", e);
        }
    }
}
